use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A unit of background work executed on a fixed interval
#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One tick. Errors are handled and logged inside.
    async fn run_once(&self);
}

/// Spawn `job` on its own timer until `cancel` fires.
///
/// The first tick happens one `period` after spawning. A tick in progress
/// always runs to completion; cancellation is only observed between ticks.
pub fn spawn_periodic<J: PeriodicJob + ?Sized>(
    job: Arc<J>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            job = job.name(),
            interval_secs = period.as_secs(),
            "Background job started"
        );

        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(job = job.name(), "Background job stopping");
                    break;
                }
                _ = interval.tick() => {
                    debug!(job = job.name(), "Background job tick");
                    job.run_once().await;
                }
            }
        }
    })
}
