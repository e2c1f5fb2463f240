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

//! Snapshot lifecycle manager
//!
//! Wires the pipeline components together:
//!
//! - creation: Run Guard -> Snapshot Creator
//! - cleanup: Run Guard -> Inventory Reader -> Retention Evaluator -> Snapshot Deleter
//!
//! The manager keeps no state between cycles. Each cycle reads the clock
//! once, recomputes everything from the live inventory, and ends with a
//! [`CycleReport`]. Cycles are bounded by a deadline; a cycle that runs past
//! it is abandoned and reported as a failure.

use std::{future::Future, sync::Arc, time::Duration};

use tracing::debug;

use crate::{
	backend::SnapshotBackend,
	clock::Clock,
	config::ManagerSettings,
	creator::{Creation, SnapshotCreator},
	cycle::{Cycle, CycleKind, CycleOutcome, CycleReport, UnsafeTimestamp},
	deleter::SnapshotDeleter,
	events::{CycleEvent, EventSink},
	guard::RunGuard,
	inventory::{InventoryError, InventoryReader},
	retention::{RetentionDecision, RetentionPolicy},
	types::Volume,
};

/// Result of a dry-run cleanup: what would be deleted right now
#[derive(Debug, Clone)]
pub struct CleanupPlan {
	pub now: chrono::DateTime<chrono::Utc>,
	pub decision: RetentionDecision,
}

pub struct SnapshotManager {
	volume: Volume,
	retention: RetentionPolicy,
	cycle_deadline: Duration,
	clock: Arc<dyn Clock>,
	sink: Arc<dyn EventSink>,
	creator: SnapshotCreator,
	inventory: InventoryReader,
	deleter: SnapshotDeleter,
	creation_guard: RunGuard,
	cleanup_guard: RunGuard,
}

impl SnapshotManager {
	pub fn new(
		settings: ManagerSettings,
		backend: Arc<dyn SnapshotBackend>,
		clock: Arc<dyn Clock>,
		sink: Arc<dyn EventSink>,
	) -> Self {
		Self {
			volume: settings.volume,
			retention: settings.retention,
			cycle_deadline: settings.cycle_deadline,
			clock,
			sink,
			creator: SnapshotCreator::new(backend.clone(), settings.call_timeout),
			inventory: InventoryReader::new(backend.clone(), settings.call_timeout),
			deleter: SnapshotDeleter::new(backend, settings.call_timeout),
			creation_guard: RunGuard::new(CycleKind::Creation),
			cleanup_guard: RunGuard::new(CycleKind::Cleanup),
		}
	}

	pub fn volume(&self) -> &Volume {
		&self.volume
	}

	pub fn retention(&self) -> RetentionPolicy {
		self.retention
	}

	/// Fire the creation pipeline
	///
	/// Returns `None` when a creation cycle is already running; the trigger
	/// is dropped.
	pub async fn trigger_creation(&self) -> Option<CycleReport> {
		let Some(_permit) = self.creation_guard.try_acquire() else {
			debug!(target: "scheduler", kind = "creation", "Cycle already running, trigger dropped");
			return None;
		};

		Some(self.run_creation_cycle().await)
	}

	/// Fire the cleanup pipeline
	///
	/// Returns `None` when a cleanup cycle is already running; the trigger
	/// is dropped.
	pub async fn trigger_cleanup(&self) -> Option<CycleReport> {
		let Some(_permit) = self.cleanup_guard.try_acquire() else {
			debug!(target: "scheduler", kind = "cleanup", "Cycle already running, trigger dropped");
			return None;
		};

		Some(self.run_cleanup_cycle().await)
	}

	/// Read the inventory and evaluate retention without deleting anything
	pub async fn plan_cleanup(&self) -> Result<CleanupPlan, InventoryError> {
		let now = self.clock.now();
		let snapshots = self
			.inventory
			.read_all(&self.volume.namespace, Some(&self.volume.name))
			.await?;

		Ok(CleanupPlan {
			now,
			decision: self.retention.evaluate(&snapshots, now),
		})
	}

	async fn run_creation_cycle(&self) -> CycleReport {
		let (cycle, mut report) = Cycle::begin(CycleKind::Creation, self.clock.now(), self.sink.clone());

		let outcome = self
			.within_deadline(async {
				match self.creator.create(&cycle, &self.volume).await {
					Ok(Creation::Created(snapshot)) => {
						report.created = Some(snapshot.name);
						CycleOutcome::Success
					}
					Ok(Creation::AlreadyExists { name }) => {
						report.skipped_existing = Some(name);
						CycleOutcome::Success
					}
					Err(e) => CycleOutcome::Failure {
						reason: e.to_string(),
					},
				}
			})
			.await;

		cycle.finish(report, outcome)
	}

	async fn run_cleanup_cycle(&self) -> CycleReport {
		let (cycle, mut report) = Cycle::begin(CycleKind::Cleanup, self.clock.now(), self.sink.clone());

		let outcome = self
			.within_deadline(self.cleanup_steps(&cycle, &mut report))
			.await;

		cycle.finish(report, outcome)
	}

	/// read -> evaluate -> delete; no delete is issued before the read completes
	async fn cleanup_steps(&self, cycle: &Cycle, report: &mut CycleReport) -> CycleOutcome {
		let snapshots = match self
			.inventory
			.read_all(&self.volume.namespace, Some(&self.volume.name))
			.await
		{
			Ok(snapshots) => snapshots,
			Err(e) => {
				return CycleOutcome::Failure {
					reason: e.to_string(),
				};
			}
		};

		let decision = self.retention.evaluate(&snapshots, cycle.started_at);

		for (snapshot, reason) in &decision.unsafe_timestamps {
			cycle.emit(CycleEvent::SnapshotRetainedUnsafeTimestamp {
				cycle_id: cycle.id,
				name: snapshot.name.clone(),
				reason: reason.to_string(),
			});
			report.retained_unsafe.push(UnsafeTimestamp {
				name: snapshot.name.clone(),
				reason: reason.reason().to_string(),
			});
		}

		for entry in &decision.expired {
			cycle.emit(CycleEvent::SnapshotExpired {
				cycle_id: cycle.id,
				name: entry.snapshot.name.clone(),
				age_secs: entry.age.num_seconds(),
			});
			report.expired.push(entry.snapshot.name.clone());
		}

		self.deleter
			.delete_all(cycle, &decision.expired, report)
			.await;

		if report.failed.is_empty() {
			CycleOutcome::Success
		} else {
			CycleOutcome::PartialFailure {
				failed: report.failed_names(),
			}
		}
	}

	async fn within_deadline<F>(&self, steps: F) -> CycleOutcome
	where
		F: Future<Output = CycleOutcome>,
	{
		match tokio::time::timeout(self.cycle_deadline, steps).await {
			Ok(outcome) => outcome,
			Err(_) => CycleOutcome::Failure {
				reason: format!(
					"cycle deadline of {} exceeded",
					humantime::format_duration(self.cycle_deadline)
				),
			},
		}
	}
}
