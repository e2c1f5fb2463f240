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

//! pgsnap Snapshot Manager
//!
//! Keeps a rolling window of point-in-time snapshots of one persistent
//! volume (typically a PostgreSQL data volume). Two independent pipelines
//! run on their own cadences:
//!
//! - creation: one deterministically named snapshot per volume per day
//! - cleanup: delete snapshots whose backend-reported age has reached the
//!   retention window
//!
//! Architecture:
//! - Stateless across cycles; every decision comes from the live inventory
//! - One clock reading per cycle, pure retention evaluation
//! - Run Guard per pipeline, overlapping triggers are dropped
//! - Storage backend behind the [`SnapshotBackend`] trait (kubectl, in-memory)

pub mod backend;
pub mod clock;
pub mod config;
pub mod creator;
pub mod cycle;
pub mod deleter;
pub mod events;
pub mod guard;
pub mod inventory;
pub mod logging;
pub mod manager;
pub mod retention;
pub mod scheduler;
pub mod types;

pub use backend::{
	BackendError, CreateOutcome, DeleteOutcome, KubectlBackend, KubectlConfig,
	MemorySnapshotBackend, SnapshotBackend, SnapshotPage,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BackendKind, ConfigError, ManagerConfig, ManagerSettings, ScheduleConfig};
pub use cycle::{CycleKind, CycleOutcome, CycleReport};
pub use events::{CycleEvent, EventSink, RecordingEventSink, TracingEventSink};
pub use guard::RunGuard;
pub use manager::{CleanupPlan, SnapshotManager};
pub use retention::{RetentionDecision, RetentionPolicy, expired};
pub use scheduler::Scheduler;
pub use types::{ReadyState, Snapshot, Volume};
