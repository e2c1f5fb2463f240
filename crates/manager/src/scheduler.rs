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

use tokio::{
	sync::watch,
	task::{JoinHandle, JoinSet},
	time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{config::ScheduleConfig, cycle::CycleKind, manager::SnapshotManager};

/// Scheduler - fires creation and cleanup cycles on independent cadences
///
/// Each pipeline has its own timer task. Every tick spawns the cycle as a
/// separate task so a slow cycle never delays the timer; overlapping ticks
/// of the same pipeline are dropped by the manager's Run Guard.
///
/// Design principles:
/// - The two pipelines never block each other
/// - Missed ticks are skipped, not replayed in a burst
/// - A failed cycle has no effect on the next tick
pub struct Scheduler {
	shutdown: watch::Sender<bool>,
	timers: Vec<JoinHandle<()>>,
}

impl Scheduler {
	/// Start both timers on the current tokio runtime
	pub fn start(manager: Arc<SnapshotManager>, config: ScheduleConfig) -> Self {
		let (shutdown, shutdown_rx) = watch::channel(false);

		info!(
			target: "scheduler",
			volume = %manager.volume(),
			creation_interval = %humantime::format_duration(config.creation_interval),
			cleanup_interval = %humantime::format_duration(config.cleanup_interval),
			run_on_start = config.run_on_start,
			"Scheduler started"
		);

		let timers = vec![
			tokio::spawn(run_timer(
				manager.clone(),
				CycleKind::Creation,
				config.creation_interval,
				config.run_on_start,
				shutdown_rx.clone(),
			)),
			tokio::spawn(run_timer(
				manager,
				CycleKind::Cleanup,
				config.cleanup_interval,
				config.run_on_start,
				shutdown_rx,
			)),
		];

		Self { shutdown, timers }
	}

	/// Stop both timers and wait for in-flight cycles to finish
	pub async fn shutdown(mut self) {
		info!(target: "scheduler", "Shutting down scheduler");
		self.shutdown.send_replace(true);

		for timer in self.timers.drain(..) {
			if let Err(e) = timer.await {
				warn!(target: "scheduler", error = %e, "Scheduler timer task failed");
			}
		}
		info!(target: "scheduler", "Scheduler stopped");
	}
}

impl Drop for Scheduler {
	fn drop(&mut self) {
		self.shutdown.send_replace(true);
	}
}

async fn run_timer(
	manager: Arc<SnapshotManager>,
	kind: CycleKind,
	period: Duration,
	run_on_start: bool,
	mut shutdown: watch::Receiver<bool>,
) {
	let start = if run_on_start {
		Instant::now()
	} else {
		Instant::now() + period
	};
	let mut ticker = time::interval_at(start, period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

	let mut cycles = JoinSet::new();

	loop {
		tokio::select! {
			_ = ticker.tick() => {
				debug!(target: "scheduler", %kind, "Trigger fired");
				let manager = manager.clone();
				cycles.spawn(async move {
					match kind {
						CycleKind::Creation => manager.trigger_creation().await,
						CycleKind::Cleanup => manager.trigger_cleanup().await,
					}
				});
			}
			Some(joined) = cycles.join_next() => {
				if let Err(e) = joined {
					warn!(target: "scheduler", %kind, error = %e, "Cycle task aborted");
				}
			}
			changed = shutdown.changed() => {
				if changed.is_err() || *shutdown.borrow() {
					break;
				}
			}
		}
	}

	while let Some(joined) = cycles.join_next().await {
		if let Err(e) = joined {
			warn!(target: "scheduler", %kind, error = %e, "Cycle task aborted");
		}
	}
	debug!(target: "scheduler", %kind, "Timer stopped");
}
