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

mod kubectl;
mod memory;

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Snapshot;
pub use kubectl::{KubectlBackend, KubectlConfig};
pub use memory::MemorySnapshotBackend;

/// Error types for storage backend calls
///
/// Every variant is retryable from the manager's point of view: the cycle
/// that hit it ends, and the next scheduled trigger tries again.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
	#[error("Backend unavailable: {0}")]
	Unavailable(String),
	#[error("Quota exceeded: {0}")]
	QuotaExceeded(String),
	#[error("Backend call timed out after {0:?}")]
	Timeout(Duration),
	#[error("Invalid backend response: {0}")]
	InvalidResponse(String),
}

/// Result of a create request
#[derive(Debug, Clone)]
pub enum CreateOutcome {
	/// The backend accepted the request and returned the new snapshot
	Created(Snapshot),
	/// A snapshot with the requested name already exists
	AlreadyExists,
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
	Deleted,
	NotFound,
}

/// One page of a list response
#[derive(Debug, Clone, Default)]
pub struct SnapshotPage {
	pub items: Vec<Snapshot>,
	/// Token for the next page; `None` on the last page
	pub continue_token: Option<String>,
}

/// Storage backend trait - the snapshot API the manager drives
///
/// Snapshot identity is the `(namespace, name)` pair. The backend is
/// expected to serialize concurrent requests against the same name, so
/// the manager holds no lock over the snapshot set itself.
///
/// Implementations:
/// - [`MemorySnapshotBackend`]: in-process, with fault injection for tests
/// - [`KubectlBackend`]: CSI `VolumeSnapshot` objects through `kubectl`
#[async_trait]
pub trait SnapshotBackend: Send + Sync {
	/// Request a snapshot named `name` of `source_volume`
	async fn create(
		&self,
		namespace: &str,
		name: &str,
		source_volume: &str,
	) -> Result<CreateOutcome, BackendError>;

	/// Read one page of snapshots in `namespace`
	///
	/// `volume_filter` restricts the page to snapshots of one source volume.
	async fn list_page(
		&self,
		namespace: &str,
		volume_filter: Option<&str>,
		continue_token: Option<&str>,
	) -> Result<SnapshotPage, BackendError>;

	/// Delete the snapshot `name` in `namespace`
	async fn delete(&self, namespace: &str, name: &str) -> Result<DeleteOutcome, BackendError>;
}

/// Bound a backend call by `limit`, mapping expiry to [`BackendError::Timeout`]
pub async fn call_with_timeout<T, F>(limit: Duration, call: F) -> Result<T, BackendError>
where
	F: Future<Output = Result<T, BackendError>>,
{
	match tokio::time::timeout(limit, call).await {
		Ok(result) => result,
		Err(_) => Err(BackendError::Timeout(limit)),
	}
}
