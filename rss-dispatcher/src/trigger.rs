use crate::sweep::SweepOrchestrator;
use crate::types::{Result, SweepSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Single-flight entry point for sweeps. Overlapping triggers never run two
/// sweeps of the same feeds at once, even if a caller stops waiting.
#[derive(Clone)]
pub struct SweepTrigger {
    orchestrator: Arc<SweepOrchestrator>,
    running: Arc<Mutex<()>>,
}

impl SweepTrigger {
    pub fn new(orchestrator: Arc<SweepOrchestrator>) -> Self {
        Self {
            orchestrator,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn orchestrator(&self) -> &Arc<SweepOrchestrator> {
        &self.orchestrator
    }

    /// Run a sweep unless one is already in progress, in which case `None`.
    ///
    /// The sweep runs in its own task that owns the lock. Dropping the
    /// returned future (an HTTP client hanging up) leaves the sweep running
    /// and the trigger busy until every feed has finished.
    pub async fn try_run(&self) -> Option<Result<SweepSummary>> {
        let guard = match self.running.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Sweep already in progress, skipping trigger");
                return None;
            }
        };

        let orchestrator = self.orchestrator.clone();
        let sweep = tokio::spawn(async move {
            let _guard = guard;
            orchestrator.run_sweep().await
        });

        Some(match sweep.await {
            Ok(result) => result,
            Err(e) => {
                error!("Sweep task failed: {}", e);
                Err(e.into())
            }
        })
    }

    /// Sweep on a fixed schedule until `shutdown` resolves.
    ///
    /// Ticks that fire while a sweep is still running are skipped.
    pub async fn run_every<F>(&self, period: Duration, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Sweeping every {:?}", period);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Periodic sweeps stopped");
                    return;
                }
                _ = ticker.tick() => {
                    match self.try_run().await {
                        Some(Ok(summary)) if summary.failed_feeds() > 0 => {
                            warn!(
                                "{} of {} feeds failed this sweep",
                                summary.failed_feeds(),
                                summary.outcomes.len()
                            );
                        }
                        Some(Ok(_)) | None => {}
                        Some(Err(e)) => error!("Sweep could not list feeds: {}", e),
                    }
                }
            }
        }
    }
}
