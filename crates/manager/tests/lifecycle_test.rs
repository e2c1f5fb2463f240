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

//! Integration tests for the snapshot lifecycle
//!
//! These tests drive the manager end to end against the in-memory backend:
//! - Creation idempotence within a day
//! - Retention boundaries and unsafe timestamps
//! - Collect-and-continue deletion and partial failure reporting
//! - Read-before-delete on inventory failures

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pgsnap_manager::{
	BackendError, CycleEvent, CycleOutcome, FixedClock, ManagerConfig, MemorySnapshotBackend,
	ReadyState, RecordingEventSink, Snapshot, SnapshotManager,
};

fn day(n: u32) -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2026, 3, n, 0, 0, 0).unwrap()
}

struct Setup {
	manager: SnapshotManager,
	backend: Arc<MemorySnapshotBackend>,
	clock: Arc<FixedClock>,
	sink: Arc<RecordingEventSink>,
}

fn setup(now: DateTime<Utc>, retention: std::time::Duration) -> Setup {
	let clock = Arc::new(FixedClock::new(now));
	let backend = Arc::new(MemorySnapshotBackend::with_clock(clock.clone()));
	let sink = Arc::new(RecordingEventSink::new());

	let mut config = ManagerConfig::new("db", "pgdata-postgres-0");
	config.retention_window = retention;
	let manager = SnapshotManager::new(
		config.validate().unwrap(),
		backend.clone(),
		clock.clone(),
		sink.clone(),
	);

	Setup {
		manager,
		backend,
		clock,
		sink,
	}
}

fn seed(backend: &MemorySnapshotBackend, name: &str, created: Option<String>) {
	backend.insert(Snapshot {
		name: name.to_string(),
		namespace: "db".to_string(),
		source_volume: "pgdata-postgres-0".to_string(),
		creation_timestamp: created,
		ready_state: ReadyState::Ready,
	});
}

const SEVEN_DAYS: std::time::Duration = std::time::Duration::from_secs(7 * 86_400);

#[tokio::test]
async fn test_two_creation_triggers_same_day_leave_one_snapshot() {
	let s = setup(day(5) + Duration::hours(1), SEVEN_DAYS);

	let first = s.manager.trigger_creation().await.unwrap();
	s.clock.advance(Duration::hours(20));
	let second = s.manager.trigger_creation().await.unwrap();

	assert!(first.outcome.is_success());
	assert!(second.outcome.is_success());
	assert_eq!(s.backend.snapshots().len(), 1);
	assert!(s.backend.contains("db", "pgdata-postgres-0-snap-2026-03-05"));
	assert_eq!(
		s.sink.names(),
		vec![
			"cycle_started",
			"snapshot_created",
			"cycle_completed",
			"cycle_started",
			"snapshot_skipped_exists",
			"cycle_completed",
		]
	);
}

#[tokio::test]
async fn test_next_day_creates_a_new_snapshot() {
	let s = setup(day(5) + Duration::hours(23), SEVEN_DAYS);

	s.manager.trigger_creation().await.unwrap();
	s.clock.advance(Duration::hours(2));
	s.manager.trigger_creation().await.unwrap();

	assert_eq!(s.backend.snapshots().len(), 2);
	assert!(s.backend.contains("db", "pgdata-postgres-0-snap-2026-03-06"));
}

#[tokio::test]
async fn test_day_ten_scenario_expires_only_day_one() {
	let s = setup(day(10), SEVEN_DAYS);
	seed(&s.backend, "snap-day1", Some(day(1).to_rfc3339()));
	seed(&s.backend, "snap-day4", Some(day(4).to_rfc3339()));
	seed(&s.backend, "snap-day9", Some(day(9).to_rfc3339()));

	let report = s.manager.trigger_cleanup().await.unwrap();

	assert_eq!(report.outcome, CycleOutcome::Success);
	assert_eq!(report.expired, vec!["snap-day1"]);
	assert_eq!(report.deleted, vec!["snap-day1"]);
	assert!(!s.backend.contains("db", "snap-day1"));
	assert!(s.backend.contains("db", "snap-day4"));
	assert!(s.backend.contains("db", "snap-day9"));
	assert_eq!(
		s.sink.names(),
		vec![
			"cycle_started",
			"snapshot_expired",
			"snapshot_deleted",
			"cycle_completed",
		]
	);
	let events = s.sink.events();
	assert!(matches!(
		&events[1],
		CycleEvent::SnapshotExpired { name, age_secs, .. }
			if name == "snap-day1" && *age_secs == 9 * 86_400
	));
	assert!(matches!(
		&events[2],
		CycleEvent::SnapshotDeleted { name, already_absent: false, .. } if name == "snap-day1"
	));
}

#[tokio::test]
async fn test_cleanup_twice_is_idempotent() {
	let s = setup(day(20), SEVEN_DAYS);
	for n in 1..=15 {
		seed(&s.backend, &format!("snap-{:02}", n), Some(day(n).to_rfc3339()));
	}

	let first = s.manager.trigger_cleanup().await.unwrap();
	let second = s.manager.trigger_cleanup().await.unwrap();

	// Day 13 is exactly seven days old on day 20.
	assert_eq!(first.deleted.len(), 13);
	assert!(second.expired.is_empty());
	assert!(second.deleted.is_empty());
	assert!(second.outcome.is_success());
	assert_eq!(s.backend.snapshots().len(), 2);
}

#[tokio::test]
async fn test_one_failed_delete_of_three_is_partial_failure() {
	let s = setup(day(20), SEVEN_DAYS);
	seed(&s.backend, "snap-a", Some(day(1).to_rfc3339()));
	seed(&s.backend, "snap-b", Some(day(2).to_rfc3339()));
	seed(&s.backend, "snap-c", Some(day(3).to_rfc3339()));
	s.backend
		.fail_delete_of("snap-b", BackendError::Unavailable("volume busy".to_string()));

	let report = s.manager.trigger_cleanup().await.unwrap();

	assert_eq!(
		report.outcome,
		CycleOutcome::PartialFailure {
			failed: vec!["snap-b".to_string()]
		}
	);
	assert_eq!(report.deleted, vec!["snap-a", "snap-c"]);
	assert_eq!(report.failed[0].name, "snap-b");
	assert_eq!(s.backend.snapshots().len(), 1);

	// The next cycle picks it up once the backend recovers.
	s.backend.clear_delete_failures();
	let retry = s.manager.trigger_cleanup().await.unwrap();
	assert!(retry.outcome.is_success());
	assert_eq!(retry.deleted, vec!["snap-b"]);
}

#[tokio::test]
async fn test_inventory_failure_mid_read_issues_no_deletes() {
	let s = setup(day(20), SEVEN_DAYS);
	for n in 1..=6 {
		seed(&s.backend, &format!("snap-{:02}", n), Some(day(n).to_rfc3339()));
	}
	s.backend.set_page_size(2);
	s.backend.fail_list_on_page(Some(1));

	let report = s.manager.trigger_cleanup().await.unwrap();

	assert!(matches!(report.outcome, CycleOutcome::Failure { .. }));
	assert_eq!(s.backend.list_calls(), 2);
	assert_eq!(s.backend.delete_calls(), 0);
	assert_eq!(s.backend.snapshots().len(), 6);
}

#[tokio::test]
async fn test_paginated_inventory_is_evaluated_whole() {
	let s = setup(day(20), SEVEN_DAYS);
	for n in 1..=9 {
		seed(&s.backend, &format!("snap-{:02}", n), Some(day(n).to_rfc3339()));
	}
	s.backend.set_page_size(4);

	let report = s.manager.trigger_cleanup().await.unwrap();

	assert_eq!(s.backend.list_calls(), 3);
	assert_eq!(report.deleted.len(), 9);
}

#[tokio::test]
async fn test_unsafe_timestamps_are_retained_and_flagged() {
	let s = setup(day(20), SEVEN_DAYS);
	seed(&s.backend, "snap-old", Some(day(1).to_rfc3339()));
	seed(&s.backend, "snap-future", Some(day(25).to_rfc3339()));
	seed(&s.backend, "snap-missing", None);
	seed(&s.backend, "snap-garbled", Some("2026-13-45".to_string()));

	let report = s.manager.trigger_cleanup().await.unwrap();

	assert!(report.outcome.is_success());
	assert_eq!(report.deleted, vec!["snap-old"]);
	let mut flagged: Vec<(String, String)> = report
		.retained_unsafe
		.iter()
		.map(|u| (u.name.clone(), u.reason.clone()))
		.collect();
	flagged.sort();
	assert_eq!(
		flagged,
		vec![
			("snap-future".to_string(), "future".to_string()),
			("snap-garbled".to_string(), "malformed".to_string()),
			("snap-missing".to_string(), "missing".to_string()),
		]
	);

	let unsafe_events = s
		.sink
		.events()
		.into_iter()
		.filter(|e| matches!(e, CycleEvent::SnapshotRetainedUnsafeTimestamp { .. }))
		.count();
	assert_eq!(unsafe_events, 3);
	assert_eq!(s.backend.snapshots().len(), 3);
}

#[tokio::test]
async fn test_cleanup_ignores_other_volumes() {
	let s = setup(day(20), SEVEN_DAYS);
	seed(&s.backend, "snap-mine", Some(day(1).to_rfc3339()));
	s.backend.insert(Snapshot {
		name: "snap-theirs".to_string(),
		namespace: "db".to_string(),
		source_volume: "redis-data".to_string(),
		creation_timestamp: Some(day(1).to_rfc3339()),
		ready_state: ReadyState::Ready,
	});

	let report = s.manager.trigger_cleanup().await.unwrap();

	assert_eq!(report.deleted, vec!["snap-mine"]);
	assert!(s.backend.contains("db", "snap-theirs"));
}

#[tokio::test]
async fn test_cycle_completed_carries_outcome() {
	let s = setup(day(20), SEVEN_DAYS);
	s.backend.fail_list_on_page(Some(0));

	s.manager.trigger_cleanup().await.unwrap();

	let completed = s
		.sink
		.events()
		.into_iter()
		.find_map(|e| match e {
			CycleEvent::CycleCompleted { outcome, .. } => Some(outcome),
			_ => None,
		})
		.unwrap();
	assert!(matches!(completed, CycleOutcome::Failure { .. }));
}
