use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::{CycleReport, ReconciliationLoop};
use crate::error::{AgentError, Result};

/// Create a linked stop handle and signal. The signal is checked between
/// messages and between cycles; an in-flight remote call is never interrupted.
pub fn stop_channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `stop` has been called. Never resolves if the handle is
    /// dropped without stopping.
    pub async fn stopped(&mut self) {
        if self.rx.wait_for(|stopped| *stopped).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Uniform range the wait before each cycle is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval {
    min: Duration,
    max: Duration,
}

impl PollInterval {
    pub fn new(min: Duration, max: Duration) -> Result<Self> {
        if min > max {
            return Err(AgentError::Config(format!(
                "poll interval minimum {min:?} exceeds maximum {max:?}"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn from_secs(min: u64, max: u64) -> Result<Self> {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    pub fn draw(&self) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(45),
            max: Duration::from_secs(120),
        }
    }
}

/// Fires a reconciliation cycle, waits a freshly drawn interval once it has
/// finished, and repeats until stopped. Cycles never overlap.
pub struct Scheduler {
    reconciler: Arc<ReconciliationLoop>,
    interval: PollInterval,
}

impl Scheduler {
    pub fn new(reconciler: Arc<ReconciliationLoop>, interval: PollInterval) -> Self {
        Self {
            reconciler,
            interval,
        }
    }

    pub async fn run(&self, mut stop: StopSignal) {
        let mut cycles = 0u64;
        loop {
            let delay = self.interval.draw();
            info!(delay_ms = delay.as_millis() as u64, "next poll scheduled");

            tokio::select! {
                _ = sleep(delay) => {}
                _ = stop.stopped() => break,
            }
            if stop.is_stopped() {
                break;
            }

            cycles += 1;
            let _ = self.tick(cycles, &stop).await;
        }
        info!(cycles, "scheduler stopped");
    }

    /// Run one cycle and log its outcome. Failures never escape.
    pub async fn tick(&self, cycle: u64, stop: &StopSignal) -> Option<CycleReport> {
        match self.reconciler.run_cycle(stop).await {
            Ok(report) => {
                if report.errors.is_empty() {
                    info!(
                        cycle,
                        candidates = report.candidates,
                        replied = report.replied,
                        skipped = report.skipped,
                        "poll cycle complete"
                    );
                } else {
                    warn!(
                        cycle,
                        candidates = report.candidates,
                        replied = report.replied,
                        skipped = report.skipped,
                        errors = report.errors.len(),
                        aborted = report.aborted,
                        "poll cycle finished with errors"
                    );
                }
                Some(report)
            }
            Err(err @ (AgentError::MissingCredentials(_) | AgentError::Auth(_))) => {
                warn!(cycle, "poll cycle skipped: {err}; re-authorize via /auth/start");
                None
            }
            Err(err) => {
                error!(cycle, "poll cycle failed: {err}");
                None
            }
        }
    }
}
