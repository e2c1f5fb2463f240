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

//! Snapshot manager entry point
//!
//! `run` keeps both pipelines on their timers until Ctrl-C. `create` and
//! `cleanup` run a single cycle and exit, for use from a Kubernetes CronJob;
//! they exit non-zero when the cycle did not succeed. `plan` shows what a
//! cleanup would delete.

use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use pgsnap_manager::{
	BackendKind, CycleReport, KubectlBackend, ManagerConfig, MemorySnapshotBackend,
	Scheduler, SnapshotBackend, SnapshotManager, SystemClock, TracingEventSink,
};

/// Volume snapshot lifecycle manager
#[derive(Parser)]
#[command(name = "pgsnap-manager")]
#[command(author, version, about, long_about = None)]
struct Cli {
	/// Configuration file (environment variables prefixed PGSNAP_ override it)
	#[arg(short, long)]
	config: Option<String>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Run creation and cleanup on their schedules until interrupted
	Run,
	/// Run one creation cycle and exit
	Create,
	/// Run one cleanup cycle and exit
	Cleanup,
	/// Show which snapshots a cleanup would delete, without deleting
	Plan,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
	let cli = Cli::parse();

	pgsnap_manager::logging::init_logging()?;

	let config = match &cli.config {
		Some(path) => ManagerConfig::from_file(path),
		None => ManagerConfig::from_env(),
	}
	.context("Failed to load configuration")?;
	let settings = config.validate().context("Invalid configuration")?;

	info!(target: "server", "Starting pgsnap manager");
	info!(target: "server", "Volume: {}", settings.volume);
	info!(
		target: "server",
		"Retention window: {}",
		humantime::format_duration(config.retention_window)
	);
	info!(target: "server", "Backend: {:?}", config.backend);

	let backend: Arc<dyn SnapshotBackend> = match config.backend {
		BackendKind::Kubectl => Arc::new(KubectlBackend::new(config.kubectl.clone())),
		BackendKind::Memory => Arc::new(MemorySnapshotBackend::new()),
	};
	let manager = Arc::new(SnapshotManager::new(
		settings,
		backend,
		Arc::new(SystemClock),
		Arc::new(TracingEventSink),
	));

	match cli.command {
		Commands::Run => {
			let scheduler = Scheduler::start(manager, config.schedule());

			signal::ctrl_c()
				.await
				.context("Failed to listen for shutdown signal")?;
			info!(target: "server", "Shutting down...");

			scheduler.shutdown().await;
			info!(target: "server", "Shutdown complete");
			Ok(ExitCode::SUCCESS)
		}
		Commands::Create => finish_one_shot(manager.trigger_creation().await),
		Commands::Cleanup => finish_one_shot(manager.trigger_cleanup().await),
		Commands::Plan => {
			let plan = manager
				.plan_cleanup()
				.await
				.context("Failed to read snapshot inventory")?;

			println!("now: {}", plan.now.to_rfc3339());
			for entry in &plan.decision.expired {
				println!(
					"delete  {}  age={}",
					entry.snapshot.name,
					humantime::format_duration(entry.age.to_std().unwrap_or_default())
				);
			}
			for snapshot in &plan.decision.retained {
				println!("keep    {}", snapshot.name);
			}
			for (snapshot, reason) in &plan.decision.unsafe_timestamps {
				println!("keep    {}  ({})", snapshot.name, reason);
			}
			Ok(ExitCode::SUCCESS)
		}
	}
}

/// Print the cycle report as JSON and map its outcome to the exit code
fn finish_one_shot(report: Option<CycleReport>) -> Result<ExitCode> {
	let Some(report) = report else {
		// A fresh process cannot find its own guard held.
		error!(target: "server", "Cycle trigger was dropped");
		return Ok(ExitCode::FAILURE);
	};

	let json = serde_json::to_string_pretty(&report).context("Failed to encode cycle report")?;
	println!("{}", json);

	if report.outcome.is_success() {
		Ok(ExitCode::SUCCESS)
	} else {
		Ok(ExitCode::FAILURE)
	}
}
