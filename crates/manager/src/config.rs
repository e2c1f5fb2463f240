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

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{backend::KubectlConfig, retention::RetentionPolicy, types::Volume};

// Logging configuration constants
/// Default log level (can be overridden by RUST_LOG environment variable)
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default log directory component name
pub const LOG_COMPONENT_NAME: &str = "manager";

/// Default console output enabled (can be overridden by LOG_TO_CONSOLE environment variable)
pub const DEFAULT_LOG_TO_CONSOLE: bool = false;

/// Environment variable prefix for manager settings (e.g. `PGSNAP_RETENTION_WINDOW`)
pub const ENV_PREFIX: &str = "PGSNAP";

// Schedule configuration constants
/// Default interval between creation cycles
pub const DEFAULT_CREATION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between cleanup cycles
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default retention window (7 days)
pub const DEFAULT_RETENTION_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default timeout for a single backend call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default deadline for a whole cycle
pub const DEFAULT_CYCLE_DEADLINE: Duration = Duration::from_secs(5 * 60);

/// Error types for configuration loading and validation
///
/// All of these are fatal at startup: the manager refuses to run with them.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Failed to load configuration: {0}")]
	Load(#[from] config::ConfigError),
	#[error("Invalid retention window: {0}")]
	InvalidRetentionWindow(String),
	#[error("Invalid {field}: {reason}")]
	Invalid { field: &'static str, reason: String },
}

/// Which storage backend the manager drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
	#[default]
	Kubectl,
	Memory,
}

/// Manager configuration as supplied by the deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
	/// Namespace of the protected volume and its snapshots
	pub namespace: String,
	/// Name of the protected volume (PersistentVolumeClaim)
	pub volume: String,
	/// Interval between creation cycles (e.g. `24h`)
	#[serde(with = "humantime_serde", default = "default_creation_interval")]
	pub creation_interval: Duration,
	/// Interval between cleanup cycles (e.g. `24h`)
	#[serde(with = "humantime_serde", default = "default_cleanup_interval")]
	pub cleanup_interval: Duration,
	/// Maximum snapshot age before deletion (e.g. `7d`)
	#[serde(with = "humantime_serde", default = "default_retention_window")]
	pub retention_window: Duration,
	/// Timeout applied to each backend call
	#[serde(with = "humantime_serde", default = "default_call_timeout")]
	pub call_timeout: Duration,
	/// Deadline for one whole cycle
	#[serde(with = "humantime_serde", default = "default_cycle_deadline")]
	pub cycle_deadline: Duration,
	/// Fire both pipelines immediately on startup
	#[serde(default = "default_run_on_start")]
	pub run_on_start: bool,
	/// Storage backend
	#[serde(default)]
	pub backend: BackendKind,
	/// kubectl backend settings
	#[serde(default)]
	pub kubectl: KubectlConfig,
}

fn default_creation_interval() -> Duration {
	DEFAULT_CREATION_INTERVAL
}

fn default_cleanup_interval() -> Duration {
	DEFAULT_CLEANUP_INTERVAL
}

fn default_retention_window() -> Duration {
	DEFAULT_RETENTION_WINDOW
}

fn default_call_timeout() -> Duration {
	DEFAULT_CALL_TIMEOUT
}

fn default_cycle_deadline() -> Duration {
	DEFAULT_CYCLE_DEADLINE
}

fn default_run_on_start() -> bool {
	true
}

impl ManagerConfig {
	pub fn new(namespace: impl Into<String>, volume: impl Into<String>) -> Self {
		Self {
			namespace: namespace.into(),
			volume: volume.into(),
			creation_interval: DEFAULT_CREATION_INTERVAL,
			cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
			retention_window: DEFAULT_RETENTION_WINDOW,
			call_timeout: DEFAULT_CALL_TIMEOUT,
			cycle_deadline: DEFAULT_CYCLE_DEADLINE,
			run_on_start: true,
			backend: BackendKind::default(),
			kubectl: KubectlConfig::default(),
		}
	}

	/// Load configuration from environment variables
	///
	/// Nested keys use a double underscore: `PGSNAP_KUBECTL__SNAPSHOT_CLASS`.
	pub fn from_env() -> Result<Self, ConfigError> {
		dotenv::dotenv().ok();

		let cfg = config::Config::builder()
			.add_source(environment())
			.build()?;

		Ok(cfg.try_deserialize()?)
	}

	/// Load configuration from file, with environment variables taking precedence
	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		dotenv::dotenv().ok();

		let cfg = config::Config::builder()
			.add_source(config::File::with_name(path))
			.add_source(environment())
			.build()?;

		Ok(cfg.try_deserialize()?)
	}

	/// Check the configuration and derive the manager settings
	pub fn validate(&self) -> Result<ManagerSettings, ConfigError> {
		require_name("namespace", &self.namespace)?;
		require_name("volume", &self.volume)?;
		require_positive("creation_interval", self.creation_interval)?;
		require_positive("cleanup_interval", self.cleanup_interval)?;
		require_positive("call_timeout", self.call_timeout)?;
		require_positive("cycle_deadline", self.cycle_deadline)?;

		Ok(ManagerSettings {
			volume: Volume::new(&self.namespace, &self.volume),
			retention: RetentionPolicy::new(self.retention_window)?,
			call_timeout: self.call_timeout,
			cycle_deadline: self.cycle_deadline,
		})
	}

	/// Scheduler cadences from this configuration
	pub fn schedule(&self) -> ScheduleConfig {
		ScheduleConfig {
			creation_interval: self.creation_interval,
			cleanup_interval: self.cleanup_interval,
			run_on_start: self.run_on_start,
		}
	}
}

fn environment() -> config::Environment {
	config::Environment::with_prefix(ENV_PREFIX)
		.prefix_separator("_")
		.separator("__")
		.try_parsing(true)
}

fn require_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
	if value.trim().is_empty() {
		return Err(ConfigError::Invalid {
			field,
			reason: "must not be empty".to_string(),
		});
	}
	Ok(())
}

fn require_positive(field: &'static str, value: Duration) -> Result<(), ConfigError> {
	if value.is_zero() {
		return Err(ConfigError::Invalid {
			field,
			reason: "must be positive".to_string(),
		});
	}
	Ok(())
}

/// Validated settings the manager runs with
#[derive(Debug, Clone)]
pub struct ManagerSettings {
	pub volume: Volume,
	pub retention: RetentionPolicy,
	pub call_timeout: Duration,
	pub cycle_deadline: Duration,
}

/// Cadences of the two scheduler timers
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
	pub creation_interval: Duration,
	pub cleanup_interval: Duration,
	pub run_on_start: bool,
}
