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

use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
	backend::{DeleteOutcome, SnapshotBackend, call_with_timeout},
	cycle::{Cycle, CycleReport, FailedDeletion},
	events::CycleEvent,
	retention::ExpiredSnapshot,
};

/// Snapshot Deleter - one delete request per expired snapshot
///
/// Deletions are independent: a failure is recorded and the remaining
/// snapshots are still attempted. "Not found" counts as deleted, since
/// another cycle or an operator may already have removed it.
///
/// Results go into the cycle report as each call returns, so a cycle cut
/// short by its deadline still reports the deletions that completed.
pub struct SnapshotDeleter {
	backend: Arc<dyn SnapshotBackend>,
	call_timeout: Duration,
}

impl SnapshotDeleter {
	pub fn new(backend: Arc<dyn SnapshotBackend>, call_timeout: Duration) -> Self {
		Self {
			backend,
			call_timeout,
		}
	}

	pub async fn delete_all(&self, cycle: &Cycle, expired: &[ExpiredSnapshot], report: &mut CycleReport) {
		for entry in expired {
			let snapshot = &entry.snapshot;
			let result = call_with_timeout(
				self.call_timeout,
				self.backend.delete(&snapshot.namespace, &snapshot.name),
			)
			.await;

			match result {
				Ok(outcome) => {
					let already_absent = outcome == DeleteOutcome::NotFound;
					if already_absent {
						debug!(target: "deleter", snapshot = %snapshot.name, "Snapshot already gone");
						report.already_absent.push(snapshot.name.clone());
					} else {
						report.deleted.push(snapshot.name.clone());
					}
					cycle.emit(CycleEvent::SnapshotDeleted {
						cycle_id: cycle.id,
						name: snapshot.name.clone(),
						already_absent,
					});
				}
				Err(e) => {
					warn!(
						target: "deleter",
						snapshot = %snapshot.name,
						error = %e,
						"Failed to delete snapshot, continuing with the rest"
					);
					report.failed.push(FailedDeletion {
						name: snapshot.name.clone(),
						error: e.to_string(),
					});
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use chrono::{Duration as ChronoDuration, Utc};

	use super::*;
	use crate::{
		backend::{BackendError, MemorySnapshotBackend},
		cycle::CycleKind,
		events::RecordingEventSink,
		types::{ReadyState, Snapshot},
	};

	fn expired_entry(name: &str) -> ExpiredSnapshot {
		ExpiredSnapshot {
			snapshot: Snapshot {
				name: name.to_string(),
				namespace: "db".to_string(),
				source_volume: "pgdata".to_string(),
				creation_timestamp: Some("2026-01-01T00:00:00Z".to_string()),
				ready_state: ReadyState::Ready,
			},
			age: ChronoDuration::days(30),
		}
	}

	#[tokio::test]
	async fn test_one_failure_does_not_block_others() {
		let backend = Arc::new(MemorySnapshotBackend::new());
		let entries = vec![expired_entry("a"), expired_entry("b"), expired_entry("c")];
		for entry in &entries {
			backend.insert(entry.snapshot.clone());
		}
		backend.fail_delete_of("b", BackendError::Unavailable("busy".to_string()));

		let deleter = SnapshotDeleter::new(backend.clone(), std::time::Duration::from_secs(5));
		let sink = Arc::new(RecordingEventSink::new());
		let (cycle, mut report) = Cycle::begin(CycleKind::Cleanup, Utc::now(), sink);

		deleter.delete_all(&cycle, &entries, &mut report).await;

		assert_eq!(report.deleted, vec!["a", "c"]);
		assert_eq!(report.failed_names(), vec!["b"]);
		assert_eq!(backend.delete_calls(), 3);
		assert!(backend.contains("db", "b"));
	}

	#[tokio::test]
	async fn test_not_found_counts_as_deleted() {
		let backend = Arc::new(MemorySnapshotBackend::new());
		let deleter = SnapshotDeleter::new(backend, std::time::Duration::from_secs(5));
		let sink = Arc::new(RecordingEventSink::new());
		let (cycle, mut report) = Cycle::begin(CycleKind::Cleanup, Utc::now(), sink.clone());

		deleter
			.delete_all(&cycle, &[expired_entry("gone")], &mut report)
			.await;

		assert!(report.failed.is_empty());
		assert!(report.deleted.is_empty());
		assert_eq!(report.already_absent, vec!["gone"]);
		assert!(matches!(
			sink.events().last(),
			Some(CycleEvent::SnapshotDeleted { name, already_absent: true, .. }) if name == "gone"
		));
	}
}
