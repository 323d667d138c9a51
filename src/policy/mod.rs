pub mod notification;
pub mod notifier;
pub mod periodic;
pub mod retention;

#[cfg(test)]
pub mod fake;

use crate::backups::BackupRepository;
use crate::config::WorkersConfig;
use crate::ledger::LedgerStorage;
use crate::storage::BlobStore;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use notification::NotificationJob;
pub use notifier::{LogNotifier, Notifier, NotifyError};
pub use periodic::{spawn_periodic, PeriodicJob};
pub use retention::RetentionJob;

/// Background jobs sharing one shutdown signal
pub struct WorkerGroup {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Default for WorkerGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerGroup {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    pub fn spawn<J: PeriodicJob + ?Sized>(&mut self, job: Arc<J>, period: Duration) {
        let handle = spawn_periodic(job, period, self.cancel.child_token());
        self.handles.push(handle);
    }

    /// Stop every job and wait for ticks in progress to finish
    pub async fn shutdown(self) {
        info!("Stopping {} background job(s)", self.handles.len());
        self.cancel.cancel();

        for result in join_all(self.handles).await {
            if let Err(e) = result {
                error!("Background job terminated abnormally: {}", e);
            }
        }
        info!("All background jobs stopped");
    }
}

/// Start the retention and notification workers
pub fn start_workers<L, B, N>(
    repo: Arc<BackupRepository<L, B>>,
    notifier: Arc<N>,
    config: &WorkersConfig,
) -> WorkerGroup
where
    L: LedgerStorage + ?Sized,
    B: BlobStore + ?Sized,
    N: Notifier + ?Sized,
{
    let mut group = WorkerGroup::new();
    group.spawn(
        Arc::new(RetentionJob::new(Arc::clone(&repo))),
        config.interval(),
    );
    group.spawn(
        Arc::new(NotificationJob::new(repo, notifier, config.alert_cooldown())),
        config.interval(),
    );
    group
}
