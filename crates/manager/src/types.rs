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

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to the persistent volume being protected
///
/// Owned by the surrounding deployment; the manager only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Volume {
	/// Namespace the volume and its snapshots live in
	pub namespace: String,
	/// Source volume (PersistentVolumeClaim) name
	pub name: String,
}

impl Volume {
	pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			namespace: namespace.into(),
			name: name.into(),
		}
	}

	/// Deterministic snapshot name for this volume on the given day
	///
	/// The name is a pure function of `(volume, day)` so that repeated
	/// creation requests on the same day collide on the backend instead of
	/// producing duplicates.
	pub fn snapshot_name_for(&self, day: NaiveDate) -> String {
		format!("{}-snap-{}", self.name, day.format("%Y-%m-%d"))
	}
}

impl fmt::Display for Volume {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.namespace, self.name)
	}
}

/// Readiness of a snapshot as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
	Pending,
	Ready,
	Error,
}

/// A point-in-time copy of a volume, as reported by the storage backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
	/// Snapshot name, unique within the namespace
	pub name: String,
	/// Namespace of the snapshot
	pub namespace: String,
	/// Name of the volume this snapshot was taken from
	pub source_volume: String,
	/// Creation timestamp exactly as the backend reported it (RFC 3339)
	///
	/// Kept raw: a missing or unparsable value must be visible to the
	/// retention evaluator rather than replaced with a guess.
	pub creation_timestamp: Option<String>,
	/// Readiness reported by the backend
	pub ready_state: ReadyState,
}

impl Snapshot {
	/// Parse the backend-reported creation timestamp
	pub fn created_at(&self) -> Result<DateTime<Utc>, TimestampError> {
		let raw = self
			.creation_timestamp
			.as_deref()
			.ok_or(TimestampError::Missing)?;

		DateTime::parse_from_rfc3339(raw)
			.map(|ts| ts.with_timezone(&Utc))
			.map_err(|e| TimestampError::Malformed {
				raw: raw.to_string(),
				reason: e.to_string(),
			})
	}
}

/// Why a snapshot's creation timestamp cannot be used to compute its age
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
	#[error("creation timestamp missing")]
	Missing,
	#[error("creation timestamp malformed ({raw}): {reason}")]
	Malformed { raw: String, reason: String },
	#[error("creation timestamp {created_at} is after now ({now})")]
	InFuture {
		created_at: DateTime<Utc>,
		now: DateTime<Utc>,
	},
}

impl TimestampError {
	/// Short machine-readable reason used in observability events
	pub fn reason(&self) -> &'static str {
		match self {
			TimestampError::Missing => "missing",
			TimestampError::Malformed { .. } => "malformed",
			TimestampError::InFuture { .. } => "future",
		}
	}
}
