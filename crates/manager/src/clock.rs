// Copyright 2025 itscheems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Time source for cycles
//!
//! Each cycle reads the clock exactly once and threads that instant through
//! naming and retention decisions, so tests can pin time with [`FixedClock`].

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Source of the current time
pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall clock used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Manually controlled clock for tests and simulations
#[derive(Debug)]
pub struct FixedClock {
	now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
	pub fn new(now: DateTime<Utc>) -> Self {
		Self {
			now: Mutex::new(now),
		}
	}

	pub fn set(&self, now: DateTime<Utc>) {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
		*now += by;
	}
}

impl Clock for FixedClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
