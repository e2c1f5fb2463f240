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

use thiserror::Error;
use tracing::{debug, error};

use crate::{
	backend::{BackendError, CreateOutcome, SnapshotBackend, call_with_timeout},
	cycle::Cycle,
	events::CycleEvent,
	types::{Snapshot, Volume},
};

/// Error types for snapshot creation
#[derive(Debug, Error)]
pub enum CreateError {
	#[error("Failed to create snapshot {name}: {source}")]
	Backend {
		name: String,
		#[source]
		source: BackendError,
	},
}

/// Result of a successful creation step
#[derive(Debug, Clone)]
pub enum Creation {
	/// A new snapshot was requested and accepted
	Created(Snapshot),
	/// Today's snapshot was already present; nothing was changed
	AlreadyExists { name: String },
}

impl Creation {
	pub fn name(&self) -> &str {
		match self {
			Creation::Created(snapshot) => &snapshot.name,
			Creation::AlreadyExists { name } => name,
		}
	}
}

/// Snapshot Creator - issues one idempotent create request per invocation
///
/// The snapshot name is derived from the volume and the cycle's day, so a
/// second invocation on the same day hits "already exists" at the backend
/// and is reported as success. Any other backend failure ends the cycle;
/// the backend either accepted the request or rejected it atomically.
pub struct SnapshotCreator {
	backend: Arc<dyn SnapshotBackend>,
	call_timeout: Duration,
}

impl SnapshotCreator {
	pub fn new(backend: Arc<dyn SnapshotBackend>, call_timeout: Duration) -> Self {
		Self {
			backend,
			call_timeout,
		}
	}

	pub async fn create(&self, cycle: &Cycle, volume: &Volume) -> Result<Creation, CreateError> {
		let name = volume.snapshot_name_for(cycle.started_at.date_naive());
		debug!(target: "creator", volume = %volume, snapshot = %name, "Requesting snapshot");

		let outcome = call_with_timeout(
			self.call_timeout,
			self.backend.create(&volume.namespace, &name, &volume.name),
		)
		.await;

		match outcome {
			Ok(CreateOutcome::Created(snapshot)) => {
				cycle.emit(CycleEvent::SnapshotCreated {
					cycle_id: cycle.id,
					name: snapshot.name.clone(),
				});
				Ok(Creation::Created(snapshot))
			}
			Ok(CreateOutcome::AlreadyExists) => {
				cycle.emit(CycleEvent::SnapshotSkippedExists {
					cycle_id: cycle.id,
					name: name.clone(),
				});
				Ok(Creation::AlreadyExists { name })
			}
			Err(e) => {
				error!(target: "creator", volume = %volume, snapshot = %name, error = %e, "Snapshot request rejected");
				Err(CreateError::Backend { name, source: e })
			}
		}
	}
}
