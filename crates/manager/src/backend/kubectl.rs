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

//! `VolumeSnapshot` backend driven through `kubectl`
//!
//! Talks to the `snapshot.storage.k8s.io/v1` API of the cluster the process
//! runs in. kubectl handles authentication (in-cluster service account or
//! kubeconfig) and chunked listing, so the backend always reports a single
//! complete page.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use super::{BackendError, CreateOutcome, DeleteOutcome, SnapshotBackend, SnapshotPage};
use crate::types::{ReadyState, Snapshot};

/// Label put on every snapshot this manager creates
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "pgsnap";

/// kubectl backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubectlConfig {
	/// kubectl executable
	pub binary: String,
	/// `VolumeSnapshotClass` used for new snapshots
	pub snapshot_class: String,
	/// Server-side chunk size for list calls
	pub list_chunk_size: u32,
}

impl Default for KubectlConfig {
	fn default() -> Self {
		Self {
			binary: "kubectl".to_string(),
			snapshot_class: "csi-hostpath-snapclass".to_string(),
			list_chunk_size: 500,
		}
	}
}

/// Snapshot backend for CSI `VolumeSnapshot` objects
pub struct KubectlBackend {
	config: KubectlConfig,
}

impl KubectlBackend {
	pub fn new(config: KubectlConfig) -> Self {
		Self { config }
	}

	async fn run(&self, args: &[&str], stdin: Option<Vec<u8>>) -> Result<KubectlOutput, BackendError> {
		debug!(target: "backend", binary = %self.config.binary, ?args, "Running kubectl");

		let mut child = Command::new(&self.config.binary)
			.args(args)
			.stdin(if stdin.is_some() {
				Stdio::piped()
			} else {
				Stdio::null()
			})
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| {
				BackendError::Unavailable(format!("failed to spawn {}: {}", self.config.binary, e))
			})?;

		if let Some(input) = stdin
			&& let Some(mut pipe) = child.stdin.take()
		{
			pipe.write_all(&input).await.map_err(|e| {
				BackendError::Unavailable(format!("failed to write kubectl stdin: {}", e))
			})?;
		}

		let output = child
			.wait_with_output()
			.await
			.map_err(|e| BackendError::Unavailable(format!("kubectl did not finish: {}", e)))?;

		Ok(KubectlOutput {
			success: output.status.success(),
			stdout: output.stdout,
			stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
		})
	}
}

struct KubectlOutput {
	success: bool,
	stdout: Vec<u8>,
	stderr: String,
}

/// How a failed kubectl call should be interpreted
#[derive(Debug, PartialEq, Eq)]
enum Failure {
	AlreadyExists,
	NotFound,
	Quota,
	Other,
}

/// `NotFound` and `AlreadyExists` only count when they are about the
/// snapshot object; a missing namespace is a real failure.
fn classify_stderr(stderr: &str) -> Failure {
	let about_snapshot = stderr.contains("volumesnapshots.snapshot.storage.k8s.io \"")
		|| stderr.contains("volumesnapshots \"")
		|| stderr.contains("volumesnapshot \"");

	if about_snapshot && stderr.contains("already exists") {
		Failure::AlreadyExists
	} else if about_snapshot && stderr.contains("not found") {
		Failure::NotFound
	} else if stderr.contains("exceeded quota") || stderr.contains("Forbidden: quota") {
		Failure::Quota
	} else {
		Failure::Other
	}
}

fn failure_to_error(stderr: String) -> BackendError {
	match classify_stderr(&stderr) {
		Failure::Quota => BackendError::QuotaExceeded(stderr),
		_ => BackendError::Unavailable(stderr),
	}
}

/// Build the `VolumeSnapshot` manifest for a create request
fn snapshot_manifest(
	namespace: &str,
	name: &str,
	source_volume: &str,
	snapshot_class: &str,
) -> serde_json::Value {
	serde_json::json!({
		"apiVersion": "snapshot.storage.k8s.io/v1",
		"kind": "VolumeSnapshot",
		"metadata": {
			"name": name,
			"namespace": namespace,
			"labels": { MANAGED_BY_LABEL: MANAGED_BY_VALUE },
		},
		"spec": {
			"volumeSnapshotClassName": snapshot_class,
			"source": { "persistentVolumeClaimName": source_volume },
		},
	})
}

#[derive(Debug, Deserialize)]
struct VolumeSnapshotList {
	#[serde(default)]
	items: Vec<VolumeSnapshotObject>,
}

#[derive(Debug, Deserialize)]
struct VolumeSnapshotObject {
	metadata: ObjectMeta,
	#[serde(default)]
	spec: Option<VolumeSnapshotSpec>,
	#[serde(default)]
	status: Option<VolumeSnapshotStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
	name: String,
	#[serde(default)]
	namespace: Option<String>,
	#[serde(default)]
	creation_timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VolumeSnapshotSpec {
	#[serde(default)]
	source: Option<VolumeSnapshotSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeSnapshotSource {
	#[serde(default)]
	persistent_volume_claim_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeSnapshotStatus {
	#[serde(default)]
	ready_to_use: Option<bool>,
	#[serde(default)]
	error: Option<serde_json::Value>,
}

impl VolumeSnapshotObject {
	fn into_snapshot(self, default_namespace: &str) -> Snapshot {
		let ready_state = match &self.status {
			Some(status) if status.error.is_some() => ReadyState::Error,
			Some(status) if status.ready_to_use == Some(true) => ReadyState::Ready,
			_ => ReadyState::Pending,
		};
		let source_volume = self
			.spec
			.and_then(|spec| spec.source)
			.and_then(|source| source.persistent_volume_claim_name)
			.unwrap_or_default();

		Snapshot {
			name: self.metadata.name,
			namespace: self
				.metadata
				.namespace
				.unwrap_or_else(|| default_namespace.to_string()),
			source_volume,
			creation_timestamp: self.metadata.creation_timestamp,
			ready_state,
		}
	}
}

/// Parse `kubectl get volumesnapshots -o json` output
fn parse_snapshot_list(
	raw: &[u8],
	namespace: &str,
	volume_filter: Option<&str>,
) -> Result<Vec<Snapshot>, BackendError> {
	let list: VolumeSnapshotList = serde_json::from_slice(raw)
		.map_err(|e| BackendError::InvalidResponse(format!("volumesnapshot list: {}", e)))?;

	Ok(list
		.items
		.into_iter()
		.map(|item| item.into_snapshot(namespace))
		.filter(|s| volume_filter.is_none_or(|v| s.source_volume == v))
		.collect())
}

#[async_trait]
impl SnapshotBackend for KubectlBackend {
	async fn create(
		&self,
		namespace: &str,
		name: &str,
		source_volume: &str,
	) -> Result<CreateOutcome, BackendError> {
		let manifest = snapshot_manifest(namespace, name, source_volume, &self.config.snapshot_class);
		let body = serde_json::to_vec(&manifest)
			.map_err(|e| BackendError::InvalidResponse(format!("manifest encoding: {}", e)))?;

		let output = self
			.run(&["create", "-f", "-", "-o", "json"], Some(body))
			.await?;

		if !output.success {
			return match classify_stderr(&output.stderr) {
				Failure::AlreadyExists => Ok(CreateOutcome::AlreadyExists),
				_ => Err(failure_to_error(output.stderr)),
			};
		}

		let created: VolumeSnapshotObject = serde_json::from_slice(&output.stdout)
			.map_err(|e| BackendError::InvalidResponse(format!("created volumesnapshot: {}", e)))?;

		Ok(CreateOutcome::Created(created.into_snapshot(namespace)))
	}

	async fn list_page(
		&self,
		namespace: &str,
		volume_filter: Option<&str>,
		_continue_token: Option<&str>,
	) -> Result<SnapshotPage, BackendError> {
		let chunk_size = format!("--chunk-size={}", self.config.list_chunk_size);
		let output = self
			.run(
				&[
					"get",
					"volumesnapshots",
					"-n",
					namespace,
					"-o",
					"json",
					chunk_size.as_str(),
				],
				None,
			)
			.await?;

		if !output.success {
			return Err(failure_to_error(output.stderr));
		}

		Ok(SnapshotPage {
			items: parse_snapshot_list(&output.stdout, namespace, volume_filter)?,
			continue_token: None,
		})
	}

	async fn delete(&self, namespace: &str, name: &str) -> Result<DeleteOutcome, BackendError> {
		let output = self
			.run(
				&["delete", "volumesnapshot", name, "-n", namespace, "--wait=false"],
				None,
			)
			.await?;

		if output.success {
			return Ok(DeleteOutcome::Deleted);
		}

		match classify_stderr(&output.stderr) {
			Failure::NotFound => Ok(DeleteOutcome::NotFound),
			_ => Err(failure_to_error(output.stderr)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const LIST: &str = r#"{
		"apiVersion": "v1",
		"kind": "List",
		"items": [
			{
				"metadata": {
					"name": "pgdata-snap-2026-01-01",
					"namespace": "db",
					"creationTimestamp": "2026-01-01T01:00:00Z"
				},
				"spec": { "source": { "persistentVolumeClaimName": "pgdata" } },
				"status": { "readyToUse": true }
			},
			{
				"metadata": { "name": "pgdata-snap-2026-01-02", "namespace": "db" },
				"spec": { "source": { "persistentVolumeClaimName": "pgdata" } },
				"status": { "readyToUse": false, "error": { "message": "csi timeout" } }
			},
			{
				"metadata": {
					"name": "other-snap",
					"creationTimestamp": "2026-01-03T01:00:00Z"
				},
				"spec": { "source": { "persistentVolumeClaimName": "other" } }
			}
		]
	}"#;

	#[test]
	fn test_parse_snapshot_list_maps_fields() {
		let snapshots = parse_snapshot_list(LIST.as_bytes(), "db", None).unwrap();
		assert_eq!(snapshots.len(), 3);

		assert_eq!(snapshots[0].ready_state, ReadyState::Ready);
		assert_eq!(
			snapshots[0].creation_timestamp.as_deref(),
			Some("2026-01-01T01:00:00Z")
		);
		assert_eq!(snapshots[1].ready_state, ReadyState::Error);
		assert!(snapshots[1].creation_timestamp.is_none());
		assert_eq!(snapshots[2].ready_state, ReadyState::Pending);
		assert_eq!(snapshots[2].namespace, "db");
	}

	#[test]
	fn test_parse_snapshot_list_applies_volume_filter() {
		let snapshots = parse_snapshot_list(LIST.as_bytes(), "db", Some("pgdata")).unwrap();
		assert_eq!(snapshots.len(), 2);
		assert!(snapshots.iter().all(|s| s.source_volume == "pgdata"));
	}

	#[test]
	fn test_parse_snapshot_list_rejects_garbage() {
		let err = parse_snapshot_list(b"not json", "db", None).unwrap_err();
		assert!(matches!(err, BackendError::InvalidResponse(_)));
	}

	#[test]
	fn test_classify_stderr() {
		assert_eq!(
			classify_stderr(
				"Error from server (AlreadyExists): volumesnapshots.snapshot.storage.k8s.io \"x\" already exists"
			),
			Failure::AlreadyExists
		);
		assert_eq!(
			classify_stderr("Error from server (NotFound): volumesnapshots \"x\" not found"),
			Failure::NotFound
		);
		assert_eq!(
			classify_stderr("Error from server (Forbidden): exceeded quota: snapshots"),
			Failure::Quota
		);
		assert_eq!(classify_stderr("connection refused"), Failure::Other);
	}

	#[test]
	fn test_missing_namespace_is_not_a_missing_snapshot() {
		assert_eq!(
			classify_stderr(
				"Error from server (NotFound): volumesnapshots.snapshot.storage.k8s.io \"pgdata-snap-2026-01-01\" not found"
			),
			Failure::NotFound
		);
		assert_eq!(
			classify_stderr("Error from server (NotFound): namespaces \"db\" not found"),
			Failure::Other
		);
		assert!(matches!(
			failure_to_error("Error from server (NotFound): namespaces \"db\" not found".to_string()),
			BackendError::Unavailable(_)
		));
	}

	#[test]
	fn test_snapshot_manifest_shape() {
		let manifest = snapshot_manifest("db", "pgdata-snap-2026-01-01", "pgdata", "csi-snapclass");
		assert_eq!(manifest["kind"], "VolumeSnapshot");
		assert_eq!(manifest["metadata"]["namespace"], "db");
		assert_eq!(
			manifest["spec"]["source"]["persistentVolumeClaimName"],
			"pgdata"
		);
		assert_eq!(manifest["spec"]["volumeSnapshotClassName"], "csi-snapclass");
		assert_eq!(manifest["metadata"]["labels"][MANAGED_BY_LABEL], MANAGED_BY_VALUE);
	}
}
