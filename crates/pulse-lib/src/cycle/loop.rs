//! Periodic driver for [`MonitorCycle`]

use super::{CycleError, MonitorCycle};
use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Runs cycles back to back with a fixed pause in between.
///
/// Cycles never overlap: the pause starts when a cycle has finished.
pub struct MonitorLoop {
    cycle: MonitorCycle,
    interval: Duration,
}

impl MonitorLoop {
    pub fn new(cycle: MonitorCycle, interval: Duration) -> Self {
        Self { cycle, interval }
    }

    /// Loop until `shutdown` fires or the history store fails
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            interval_secs = self.interval.as_secs(),
            env = %self.cycle.config().env_name,
            "Starting monitoring loop"
        );

        loop {
            match self.cycle.run_once(Utc::now()).await {
                Ok(outcome) => {
                    self.cycle.health().set_ready(true).await;
                    if !outcome.failures.is_empty() {
                        warn!(
                            failed = outcome.failures.len(),
                            "Cycle completed with defaulted results"
                        );
                    }
                }
                Err(CycleError::Store(e)) => {
                    self.cycle.logger().log_shutdown("history store failure");
                    return Err(anyhow::Error::new(e).context("History store failed, stopping"));
                }
                Err(e) => {
                    warn!(error = %e, "Cycle failed, retrying after the interval");
                }
            }

            info!(
                wait_secs = self.interval.as_secs(),
                "Waiting before the next cycle"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down monitoring loop");
                    return Ok(());
                }
            }
        }
    }
}
