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

//! Cycle observability events
//!
//! Every cycle reports its progress as a stream of [`CycleEvent`]s through an
//! [`EventSink`]. The default [`TracingEventSink`] turns them into structured
//! `tracing` events; [`RecordingEventSink`] keeps them in memory for tests.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cycle::{CycleKind, CycleOutcome};

/// Structured event emitted during a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CycleEvent {
	CycleStarted {
		cycle_id: Uuid,
		kind: CycleKind,
	},
	SnapshotCreated {
		cycle_id: Uuid,
		name: String,
	},
	SnapshotSkippedExists {
		cycle_id: Uuid,
		name: String,
	},
	SnapshotExpired {
		cycle_id: Uuid,
		name: String,
		age_secs: i64,
	},
	SnapshotDeleted {
		cycle_id: Uuid,
		name: String,
		already_absent: bool,
	},
	SnapshotRetainedUnsafeTimestamp {
		cycle_id: Uuid,
		name: String,
		reason: String,
	},
	CycleCompleted {
		cycle_id: Uuid,
		kind: CycleKind,
		outcome: CycleOutcome,
	},
}

impl CycleEvent {
	/// Event name as it appears in logs
	pub fn name(&self) -> &'static str {
		match self {
			CycleEvent::CycleStarted { .. } => "cycle_started",
			CycleEvent::SnapshotCreated { .. } => "snapshot_created",
			CycleEvent::SnapshotSkippedExists { .. } => "snapshot_skipped_exists",
			CycleEvent::SnapshotExpired { .. } => "snapshot_expired",
			CycleEvent::SnapshotDeleted { .. } => "snapshot_deleted",
			CycleEvent::SnapshotRetainedUnsafeTimestamp { .. } => {
				"snapshot_retained_unsafe_timestamp"
			}
			CycleEvent::CycleCompleted { .. } => "cycle_completed",
		}
	}
}

/// Destination for cycle events
pub trait EventSink: Send + Sync {
	fn emit(&self, event: CycleEvent);
}

/// Emits cycle events as `tracing` events under the `cycle` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
	fn emit(&self, event: CycleEvent) {
		let name = event.name();
		match event {
			CycleEvent::CycleStarted { cycle_id, kind } => {
				debug!(target: "cycle", event = name, %cycle_id, %kind, "Cycle started");
			}
			CycleEvent::SnapshotCreated { cycle_id, name: snapshot } => {
				info!(target: "cycle", event = name, %cycle_id, snapshot = %snapshot, "Snapshot created");
			}
			CycleEvent::SnapshotSkippedExists { cycle_id, name: snapshot } => {
				info!(
					target: "cycle",
					event = name,
					%cycle_id,
					snapshot = %snapshot,
					"Snapshot already exists, nothing to do"
				);
			}
			CycleEvent::SnapshotExpired {
				cycle_id,
				name: snapshot,
				age_secs,
			} => {
				info!(
					target: "cycle",
					event = name,
					%cycle_id,
					snapshot = %snapshot,
					age_secs,
					"Snapshot expired"
				);
			}
			CycleEvent::SnapshotDeleted {
				cycle_id,
				name: snapshot,
				already_absent,
			} => {
				info!(
					target: "cycle",
					event = name,
					%cycle_id,
					snapshot = %snapshot,
					already_absent,
					"Snapshot deleted"
				);
			}
			CycleEvent::SnapshotRetainedUnsafeTimestamp {
				cycle_id,
				name: snapshot,
				reason,
			} => {
				warn!(
					target: "cycle",
					event = name,
					%cycle_id,
					snapshot = %snapshot,
					reason = %reason,
					"Snapshot retained: creation timestamp unusable"
				);
			}
			CycleEvent::CycleCompleted {
				cycle_id,
				kind,
				outcome,
			} => match &outcome {
				CycleOutcome::Success => {
					info!(target: "cycle", event = name, %cycle_id, %kind, outcome = "success", "Cycle completed");
				}
				CycleOutcome::PartialFailure { failed } => {
					warn!(
						target: "cycle",
						event = name,
						%cycle_id,
						%kind,
						outcome = "partial_failure",
						failed = ?failed,
						"Cycle completed with failures"
					);
				}
				CycleOutcome::Failure { reason } => {
					warn!(
						target: "cycle",
						event = name,
						%cycle_id,
						%kind,
						outcome = "failure",
						reason = %reason,
						"Cycle failed"
					);
				}
			},
		}
	}
}

/// Keeps every emitted event in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
	events: Mutex<Vec<CycleEvent>>,
}

impl RecordingEventSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<CycleEvent> {
		self.events
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	/// Names of the recorded events, in emission order
	pub fn names(&self) -> Vec<&'static str> {
		self.events
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.iter()
			.map(CycleEvent::name)
			.collect()
	}

	pub fn clear(&self) {
		self.events
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.clear();
	}
}

impl EventSink for RecordingEventSink {
	fn emit(&self, event: CycleEvent) {
		self.events
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.push(event);
	}
}
