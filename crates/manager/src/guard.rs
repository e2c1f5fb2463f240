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

use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use crate::cycle::CycleKind;

/// Run Guard - at most one running cycle per pipeline
///
/// State machine: `idle -> running -> idle`. A trigger that finds the guard
/// `running` is dropped, not queued: on a fixed schedule an overlapping run
/// is redundant work, not backlog. The guard is process-local.
#[derive(Debug, Clone)]
pub struct RunGuard {
	kind: CycleKind,
	running: Arc<AtomicBool>,
}

impl RunGuard {
	pub fn new(kind: CycleKind) -> Self {
		Self {
			kind,
			running: Arc::new(AtomicBool::new(false)),
		}
	}

	pub fn kind(&self) -> CycleKind {
		self.kind
	}

	/// Move `idle -> running`, or return `None` if a cycle is already running
	pub fn try_acquire(&self) -> Option<RunPermit> {
		self.running
			.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
			.ok()
			.map(|_| RunPermit {
				running: self.running.clone(),
			})
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::Acquire)
	}
}

/// Proof that a cycle holds its pipeline; returns the guard to `idle` on drop
///
/// Dropping covers every exit path, including a cancelled or panicking cycle.
#[derive(Debug)]
pub struct RunPermit {
	running: Arc<AtomicBool>,
}

impl Drop for RunPermit {
	fn drop(&mut self) {
		self.running.store(false, Ordering::Release);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_second_acquire_is_dropped_until_release() {
		let guard = RunGuard::new(CycleKind::Cleanup);

		let permit = guard.try_acquire().expect("idle guard");
		assert!(guard.is_running());
		assert!(guard.try_acquire().is_none());

		drop(permit);
		assert!(!guard.is_running());
		assert!(guard.try_acquire().is_some());
	}

	#[test]
	fn test_pipelines_are_independent() {
		let creation = RunGuard::new(CycleKind::Creation);
		let cleanup = RunGuard::new(CycleKind::Cleanup);

		let _creating = creation.try_acquire().unwrap();
		assert!(cleanup.try_acquire().is_some());
	}

	#[test]
	fn test_concurrent_acquire_admits_one() {
		let guard = RunGuard::new(CycleKind::Creation);
		let barrier = Arc::new(std::sync::Barrier::new(8));

		let handles: Vec<_> = (0..8)
			.map(|_| {
				let guard = guard.clone();
				let barrier = barrier.clone();
				std::thread::spawn(move || {
					barrier.wait();
					guard.try_acquire()
				})
			})
			.collect();

		let permits: Vec<RunPermit> = handles
			.into_iter()
			.filter_map(|h| h.join().unwrap())
			.collect();
		assert_eq!(permits.len(), 1);
	}
}
