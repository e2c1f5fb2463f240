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

//! Cycle bookkeeping
//!
//! A cycle is one execution of either the creation or the cleanup pipeline.
//! It is never persisted: it lives for the duration of one run and ends in a
//! [`CycleReport`] with a terminal [`CycleOutcome`].

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::events::{CycleEvent, EventSink};

/// Which pipeline a cycle belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
	Creation,
	Cleanup,
}

impl fmt::Display for CycleKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CycleKind::Creation => f.write_str("creation"),
			CycleKind::Cleanup => f.write_str("cleanup"),
		}
	}
}

/// Terminal outcome of a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
	Success,
	/// Some deletions failed; the named snapshots are still present
	PartialFailure { failed: Vec<String> },
	/// The cycle could not do its work
	Failure { reason: String },
}

impl CycleOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, CycleOutcome::Success)
	}
}

/// A snapshot whose delete request failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDeletion {
	pub name: String,
	pub error: String,
}

/// A snapshot kept because its creation timestamp could not be trusted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnsafeTimestamp {
	pub name: String,
	pub reason: String,
}

/// Everything a cycle did, returned to the caller when it ends
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
	pub cycle_id: Uuid,
	pub kind: CycleKind,
	/// The single clock reading every decision in this cycle used
	pub started_at: DateTime<Utc>,
	pub outcome: CycleOutcome,
	/// Name of the snapshot created by a creation cycle
	#[serde(skip_serializing_if = "Option::is_none")]
	pub created: Option<String>,
	/// Name of the snapshot that already existed
	#[serde(skip_serializing_if = "Option::is_none")]
	pub skipped_existing: Option<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub expired: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub deleted: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub already_absent: Vec<String>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub failed: Vec<FailedDeletion>,
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub retained_unsafe: Vec<UnsafeTimestamp>,
}

impl CycleReport {
	fn new(cycle: &Cycle) -> Self {
		Self {
			cycle_id: cycle.id,
			kind: cycle.kind,
			started_at: cycle.started_at,
			outcome: CycleOutcome::Success,
			created: None,
			skipped_existing: None,
			expired: Vec::new(),
			deleted: Vec::new(),
			already_absent: Vec::new(),
			failed: Vec::new(),
			retained_unsafe: Vec::new(),
		}
	}

	pub fn failed_names(&self) -> Vec<String> {
		self.failed.iter().map(|f| f.name.clone()).collect()
	}
}

/// Execution context of one running cycle
pub struct Cycle {
	pub id: Uuid,
	pub kind: CycleKind,
	pub started_at: DateTime<Utc>,
	sink: Arc<dyn EventSink>,
}

impl Cycle {
	/// Start a cycle and emit `cycle_started`
	pub fn begin(kind: CycleKind, started_at: DateTime<Utc>, sink: Arc<dyn EventSink>) -> (Self, CycleReport) {
		let cycle = Self {
			id: Uuid::new_v4(),
			kind,
			started_at,
			sink,
		};
		cycle.emit(CycleEvent::CycleStarted {
			cycle_id: cycle.id,
			kind,
		});
		let report = CycleReport::new(&cycle);
		(cycle, report)
	}

	pub fn emit(&self, event: CycleEvent) {
		self.sink.emit(event);
	}

	/// Seal the report with its outcome and emit `cycle_completed`
	pub fn finish(&self, mut report: CycleReport, outcome: CycleOutcome) -> CycleReport {
		self.emit(CycleEvent::CycleCompleted {
			cycle_id: self.id,
			kind: self.kind,
			outcome: outcome.clone(),
		});
		report.outcome = outcome;
		report
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::events::RecordingEventSink;

	#[test]
	fn test_cycle_emits_start_and_completion() {
		let sink = Arc::new(RecordingEventSink::new());
		let (cycle, report) = Cycle::begin(CycleKind::Creation, Utc::now(), sink.clone());

		let report = cycle.finish(
			report,
			CycleOutcome::Failure {
				reason: "backend unavailable".to_string(),
			},
		);

		assert_eq!(sink.names(), vec!["cycle_started", "cycle_completed"]);
		assert!(!report.outcome.is_success());
		assert_eq!(report.cycle_id, cycle.id);
	}

	#[test]
	fn test_report_json_omits_empty_lists() {
		let sink = Arc::new(RecordingEventSink::new());
		let (cycle, mut report) = Cycle::begin(CycleKind::Creation, Utc::now(), sink);
		report.created = Some("pgdata-snap-2026-01-01".to_string());
		let report = cycle.finish(report, CycleOutcome::Success);

		let json = serde_json::to_value(&report).unwrap();
		assert_eq!(json["created"], "pgdata-snap-2026-01-01");
		for field in ["expired", "deleted", "already_absent", "failed", "retained_unsafe"] {
			assert!(json.get(field).is_none(), "{} should be omitted", field);
		}

		let (cycle, mut report) = Cycle::begin(CycleKind::Cleanup, Utc::now(), Arc::new(RecordingEventSink::new()));
		report.deleted.push("pgdata-snap-2025-12-01".to_string());
		let json = serde_json::to_value(cycle.finish(report, CycleOutcome::Success)).unwrap();
		assert_eq!(json["deleted"][0], "pgdata-snap-2025-12-01");
		assert!(json.get("failed").is_none());
	}

	#[test]
	fn test_outcome_serialization() {
		let partial = CycleOutcome::PartialFailure {
			failed: vec!["a".to_string()],
		};
		let json = serde_json::to_value(&partial).unwrap();
		assert_eq!(json["partial_failure"]["failed"][0], "a");

		let json = serde_json::to_value(CycleOutcome::Success).unwrap();
		assert_eq!(json, "success");
	}
}
