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

use std::{collections::HashSet, sync::Arc, time::Duration};

use thiserror::Error;
use tracing::{debug, error};

use crate::{
	backend::{BackendError, SnapshotBackend, call_with_timeout},
	types::Snapshot,
};

/// Error types for inventory reads
#[derive(Debug, Error)]
pub enum InventoryError {
	#[error("Failed to read snapshot inventory (page {page}): {source}")]
	ReadFailed {
		page: usize,
		#[source]
		source: BackendError,
	},
	#[error("Backend repeated continue token {0}, refusing to loop")]
	RepeatedToken(String),
}

/// Snapshot Inventory Reader - complete, authoritative snapshot listing
///
/// Follows continue tokens until the backend reports the last page. A
/// failure on any page discards everything read so far: retention must
/// never be evaluated against a partial list.
pub struct InventoryReader {
	backend: Arc<dyn SnapshotBackend>,
	call_timeout: Duration,
}

impl InventoryReader {
	pub fn new(backend: Arc<dyn SnapshotBackend>, call_timeout: Duration) -> Self {
		Self {
			backend,
			call_timeout,
		}
	}

	pub async fn read_all(
		&self,
		namespace: &str,
		volume_filter: Option<&str>,
	) -> Result<Vec<Snapshot>, InventoryError> {
		let mut snapshots = Vec::new();
		let mut seen_tokens = HashSet::new();
		let mut token: Option<String> = None;
		let mut page = 0;

		loop {
			let result = call_with_timeout(
				self.call_timeout,
				self.backend
					.list_page(namespace, volume_filter, token.as_deref()),
			)
			.await;

			let listed = match result {
				Ok(listed) => listed,
				Err(e) => {
					error!(
						target: "inventory",
						namespace = namespace,
						page = page,
						error = %e,
						"Inventory read failed"
					);
					return Err(InventoryError::ReadFailed { page, source: e });
				}
			};

			snapshots.extend(listed.items);
			page += 1;

			match listed.continue_token {
				Some(next) => {
					if !seen_tokens.insert(next.clone()) {
						return Err(InventoryError::RepeatedToken(next));
					}
					token = Some(next);
				}
				None => break,
			}
		}

		debug!(
			target: "inventory",
			namespace = namespace,
			pages = page,
			snapshots = snapshots.len(),
			"Inventory read complete"
		);
		Ok(snapshots)
	}
}
