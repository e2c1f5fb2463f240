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

//! Retention evaluation
//!
//! A pure decision over a complete inventory: given the snapshots, a single
//! `now` and the retention window, which snapshots are old enough to delete.
//! Snapshots whose age cannot be established (timestamp missing, malformed,
//! or later than `now`) are always kept and reported separately.

use chrono::{DateTime, Duration, Utc};

use crate::{
	config::ConfigError,
	types::{Snapshot, TimestampError},
};

/// Maximum age a snapshot may reach before it becomes eligible for deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
	window: Duration,
}

impl RetentionPolicy {
	/// Build a policy; the window must be strictly positive
	pub fn new(window: std::time::Duration) -> Result<Self, ConfigError> {
		if window.is_zero() {
			return Err(ConfigError::InvalidRetentionWindow(
				"retention window must be positive".to_string(),
			));
		}
		let window = Duration::from_std(window)
			.map_err(|e| ConfigError::InvalidRetentionWindow(e.to_string()))?;

		Ok(Self { window })
	}

	pub fn window(&self) -> Duration {
		self.window
	}

	pub fn evaluate(&self, snapshots: &[Snapshot], now: DateTime<Utc>) -> RetentionDecision {
		expired(snapshots, now, self.window)
	}
}

/// A snapshot selected for deletion, with the age that qualified it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredSnapshot {
	pub snapshot: Snapshot,
	pub age: Duration,
}

/// Outcome of one retention evaluation
///
/// Every list is sorted by `(namespace, name)` and then by timestamp, so the
/// decision does not depend on the order the inventory arrived in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionDecision {
	pub expired: Vec<ExpiredSnapshot>,
	pub retained: Vec<Snapshot>,
	pub unsafe_timestamps: Vec<(Snapshot, TimestampError)>,
}

impl RetentionDecision {
	pub fn expired_names(&self) -> Vec<String> {
		self.expired.iter().map(|e| e.snapshot.name.clone()).collect()
	}
}

/// Decide which snapshots have reached the retention window
///
/// A snapshot is expired iff `now - creation_timestamp >= window`.
pub fn expired(snapshots: &[Snapshot], now: DateTime<Utc>, window: Duration) -> RetentionDecision {
	// Entries sharing a name are each evaluated on their own timestamp; only
	// exact copies collapse.
	let mut sorted: Vec<&Snapshot> = snapshots.iter().collect();
	sorted.sort_by(|a, b| {
		(&a.namespace, &a.name, &a.creation_timestamp, &a.source_volume)
			.cmp(&(&b.namespace, &b.name, &b.creation_timestamp, &b.source_volume))
			.then((a.ready_state as u8).cmp(&(b.ready_state as u8)))
	});
	sorted.dedup();

	let mut decision = RetentionDecision::default();
	for snapshot in sorted {
		let created_at = match snapshot.created_at() {
			Ok(ts) if ts > now => {
				decision.unsafe_timestamps.push((
					snapshot.clone(),
					TimestampError::InFuture {
						created_at: ts,
						now,
					},
				));
				continue;
			}
			Ok(ts) => ts,
			Err(e) => {
				decision.unsafe_timestamps.push((snapshot.clone(), e));
				continue;
			}
		};

		let age = now - created_at;
		if age >= window {
			decision.expired.push(ExpiredSnapshot {
				snapshot: snapshot.clone(),
				age,
			});
		} else {
			decision.retained.push(snapshot.clone());
		}
	}

	decision
}
