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

//! Logging initialization for the snapshot manager
//!
//! # Configuration
//!
//! - `RUST_LOG`: Log level filter (default: `info`)
//!   - Per target: `RUST_LOG=info,cycle=debug,backend=debug`
//!
//! - `LOG_DIR`: Root directory for log files (default: `{project_root}/logs`)
//!   - Log files are created in `{LOG_DIR}/manager/`
//!
//! - `LOG_TO_CONSOLE`: Also write to stderr (default: `false`)
//!   - `true`, `1`, or `yes` enables it. In a CronJob pod this is usually
//!     what you want, since the container log is the only log.
//!
//! # Log File Format
//!
//! - Rotation: one file per day (UTC), `manager.{date}.log`
//! - Format: UTC timestamp, thread ID, log level, target, message and fields
//! - ANSI colors: disabled in files, enabled on the console

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::{
	non_blocking,
	rolling::{self, Rotation},
};
use tracing_subscriber::{
	EnvFilter, fmt, layer::SubscriberExt, registry::Registry, util::SubscriberInitExt,
};

use crate::config::{DEFAULT_LOG_LEVEL, DEFAULT_LOG_TO_CONSOLE, LOG_COMPONENT_NAME};

// Keeps the non-blocking writer flushing until process exit
static LOG_GUARD: OnceLock<non_blocking::WorkerGuard> = OnceLock::new();

/// Find the directory holding the workspace `Cargo.toml`, falling back to
/// the current directory when running outside a checkout (e.g. in a container)
fn find_project_root() -> std::path::PathBuf {
	if let Ok(mut current) = env::current_dir() {
		let start = current.clone();
		loop {
			let cargo_toml = current.join("Cargo.toml");
			if let Ok(content) = std::fs::read_to_string(&cargo_toml)
				&& content.contains("[workspace]")
			{
				return current;
			}
			if !current.pop() {
				break;
			}
		}
		return start;
	}

	Path::new(".").to_path_buf()
}

fn get_log_root() -> String {
	env::var("LOG_DIR").unwrap_or_else(|_| {
		find_project_root()
			.join("logs")
			.to_string_lossy()
			.to_string()
	})
}

/// Daily rolling file writer in `log_dir`, e.g. `manager.2026-01-03.log`
fn setup_file_logging(log_dir: &Path) -> Result<non_blocking::NonBlocking> {
	let file_appender = rolling::RollingFileAppender::builder()
		.rotation(Rotation::DAILY)
		.filename_prefix(LOG_COMPONENT_NAME.to_string())
		.filename_suffix("log")
		.build(log_dir)
		.with_context(|| {
			format!(
				"Failed to create rolling file appender in {}",
				log_dir.display()
			)
		})?;

	let (file_writer, guard) = non_blocking(file_appender);
	LOG_GUARD.set(guard).ok();

	Ok(file_writer)
}

/// Initialize logging with file output and optional console output
///
/// See module-level documentation for environment variable configuration.
pub fn init_logging() -> Result<()> {
	dotenv::dotenv().ok();

	let log_level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

	let log_root = get_log_root();
	let log_dir = Path::new(&log_root).join(LOG_COMPONENT_NAME);
	std::fs::create_dir_all(&log_dir)
		.with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

	let file_writer = setup_file_logging(&log_dir)?;

	let log_to_console = env::var("LOG_TO_CONSOLE")
		.map(|v| v == "true" || v == "1" || v == "yes")
		.unwrap_or(DEFAULT_LOG_TO_CONSOLE);

	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

	let subscriber = Registry::default().with(filter).with(
		fmt::layer()
			.with_writer(file_writer)
			.with_timer(fmt::time::UtcTime::rfc_3339())
			.with_thread_ids(true)
			.with_target(true)
			.with_thread_names(false)
			.with_ansi(false),
	);

	if log_to_console {
		subscriber
			.with(
				fmt::layer()
					.with_writer(std::io::stderr)
					.with_timer(fmt::time::UtcTime::rfc_3339())
					.with_thread_ids(true)
					.with_target(true)
					.with_thread_names(false)
					.with_ansi(true),
			)
			.try_init()
			.context("Failed to install tracing subscriber")?;
	} else {
		subscriber
			.try_init()
			.context("Failed to install tracing subscriber")?;
	}

	info!(target: "server", "Log level: {}", log_level);
	info!(target: "server", "Log directory: {}", log_dir.display());
	if log_to_console {
		info!(target: "server", "Console output: enabled");
	}

	Ok(())
}
