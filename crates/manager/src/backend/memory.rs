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

use std::{
	collections::{BTreeMap, HashMap},
	sync::{
		Arc, Mutex, MutexGuard, PoisonError,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use async_trait::async_trait;

use super::{BackendError, CreateOutcome, DeleteOutcome, SnapshotBackend, SnapshotPage};
use crate::{
	clock::{Clock, SystemClock},
	types::{ReadyState, Snapshot},
};

#[derive(Default)]
struct MemoryState {
	snapshots: BTreeMap<(String, String), Snapshot>,
	page_size: usize,
	call_delay: Option<Duration>,
	create_failure: Option<BackendError>,
	list_failure_on_page: Option<usize>,
	delete_failures: HashMap<String, BackendError>,
}

/// In-memory snapshot backend
///
/// Stores snapshots in memory only. Suitable for:
/// - Unit and integration tests (fault injection, call counters)
/// - Dry runs of the scheduler without a cluster
///
/// Creation timestamps are stamped from the backend's own clock, the same
/// way a real backend assigns them, and snapshots are created `ready`.
pub struct MemorySnapshotBackend {
	state: Mutex<MemoryState>,
	clock: Arc<dyn Clock>,
	create_calls: AtomicUsize,
	list_calls: AtomicUsize,
	delete_calls: AtomicUsize,
}

impl MemorySnapshotBackend {
	pub fn new() -> Self {
		Self::with_clock(Arc::new(SystemClock))
	}

	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self {
			state: Mutex::new(MemoryState::default()),
			clock,
			create_calls: AtomicUsize::new(0),
			list_calls: AtomicUsize::new(0),
			delete_calls: AtomicUsize::new(0),
		}
	}

	fn state(&self) -> MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Seed a snapshot directly, bypassing `create`
	pub fn insert(&self, snapshot: Snapshot) {
		let key = (snapshot.namespace.clone(), snapshot.name.clone());
		self.state().snapshots.insert(key, snapshot);
	}

	/// Remove a snapshot out of band, as an operator would
	pub fn remove(&self, namespace: &str, name: &str) -> Option<Snapshot> {
		self.state()
			.snapshots
			.remove(&(namespace.to_string(), name.to_string()))
	}

	pub fn contains(&self, namespace: &str, name: &str) -> bool {
		self.state()
			.snapshots
			.contains_key(&(namespace.to_string(), name.to_string()))
	}

	/// All stored snapshots, ordered by `(namespace, name)`
	pub fn snapshots(&self) -> Vec<Snapshot> {
		self.state().snapshots.values().cloned().collect()
	}

	/// Page size for `list_page`; 0 returns everything in one page
	pub fn set_page_size(&self, page_size: usize) {
		self.state().page_size = page_size;
	}

	/// Delay applied before every call is served
	pub fn set_call_delay(&self, delay: Option<Duration>) {
		self.state().call_delay = delay;
	}

	/// Make every `create` fail with `error` until cleared
	pub fn fail_creates(&self, error: Option<BackendError>) {
		self.state().create_failure = error;
	}

	/// Make the list call for page index `page` (0-based) fail
	pub fn fail_list_on_page(&self, page: Option<usize>) {
		self.state().list_failure_on_page = page;
	}

	/// Make deletes of `name` fail with `error`
	pub fn fail_delete_of(&self, name: impl Into<String>, error: BackendError) {
		self.state().delete_failures.insert(name.into(), error);
	}

	pub fn clear_delete_failures(&self) {
		self.state().delete_failures.clear();
	}

	pub fn create_calls(&self) -> usize {
		self.create_calls.load(Ordering::SeqCst)
	}

	pub fn list_calls(&self) -> usize {
		self.list_calls.load(Ordering::SeqCst)
	}

	pub fn delete_calls(&self) -> usize {
		self.delete_calls.load(Ordering::SeqCst)
	}

	async fn apply_delay(&self) {
		let delay = self.state().call_delay;
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}
	}
}

impl Default for MemorySnapshotBackend {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl SnapshotBackend for MemorySnapshotBackend {
	async fn create(
		&self,
		namespace: &str,
		name: &str,
		source_volume: &str,
	) -> Result<CreateOutcome, BackendError> {
		self.create_calls.fetch_add(1, Ordering::SeqCst);
		self.apply_delay().await;

		let mut state = self.state();
		if let Some(err) = state.create_failure.clone() {
			return Err(err);
		}

		let key = (namespace.to_string(), name.to_string());
		if state.snapshots.contains_key(&key) {
			return Ok(CreateOutcome::AlreadyExists);
		}

		let snapshot = Snapshot {
			name: name.to_string(),
			namespace: namespace.to_string(),
			source_volume: source_volume.to_string(),
			creation_timestamp: Some(self.clock.now().to_rfc3339()),
			ready_state: ReadyState::Ready,
		};
		state.snapshots.insert(key, snapshot.clone());

		Ok(CreateOutcome::Created(snapshot))
	}

	async fn list_page(
		&self,
		namespace: &str,
		volume_filter: Option<&str>,
		continue_token: Option<&str>,
	) -> Result<SnapshotPage, BackendError> {
		self.list_calls.fetch_add(1, Ordering::SeqCst);
		self.apply_delay().await;

		let offset = match continue_token {
			Some(token) => token.parse::<usize>().map_err(|_| {
				BackendError::InvalidResponse(format!("unknown continue token: {}", token))
			})?,
			None => 0,
		};

		let state = self.state();
		let page_index = match state.page_size {
			0 => 0,
			size => offset / size,
		};
		if state.list_failure_on_page == Some(page_index) {
			return Err(BackendError::Unavailable(format!(
				"list failed on page {}",
				page_index
			)));
		}

		let matching: Vec<&Snapshot> = state
			.snapshots
			.values()
			.filter(|s| s.namespace == namespace)
			.filter(|s| volume_filter.is_none_or(|v| s.source_volume == v))
			.collect();

		let take = match state.page_size {
			0 => matching.len(),
			size => size,
		};
		let items: Vec<Snapshot> = matching
			.iter()
			.skip(offset)
			.take(take)
			.map(|s| (*s).clone())
			.collect();

		let next = offset + items.len();
		let continue_token = (next < matching.len()).then(|| next.to_string());

		Ok(SnapshotPage {
			items,
			continue_token,
		})
	}

	async fn delete(&self, namespace: &str, name: &str) -> Result<DeleteOutcome, BackendError> {
		self.delete_calls.fetch_add(1, Ordering::SeqCst);
		self.apply_delay().await;

		let mut state = self.state();
		if let Some(err) = state.delete_failures.get(name) {
			return Err(err.clone());
		}

		match state
			.snapshots
			.remove(&(namespace.to_string(), name.to_string()))
		{
			Some(_) => Ok(DeleteOutcome::Deleted),
			None => Ok(DeleteOutcome::NotFound),
		}
	}
}
