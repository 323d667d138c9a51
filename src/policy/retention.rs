use crate::backups::{BackupError, BackupRepository, REASON_RETENTION};
use crate::ledger::{LedgerStorage, Project};
use crate::policy::periodic::PeriodicJob;
use crate::storage::BlobStore;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Prunes every project down to its newest `retention_count` backups
pub struct RetentionJob<L: LedgerStorage + ?Sized, B: BlobStore + ?Sized> {
    repo: Arc<BackupRepository<L, B>>,
}

impl<L: LedgerStorage + ?Sized, B: BlobStore + ?Sized> RetentionJob<L, B> {
    pub fn new(repo: Arc<BackupRepository<L, B>>) -> Self {
        Self { repo }
    }

    /// One pass over all projects
    pub async fn apply(&self) {
        let summaries = match self.repo.list_projects().await {
            Ok(summaries) => summaries,
            Err(e) => {
                error!("Retention: unable to list projects: {}", e);
                return;
            }
        };

        for summary in summaries {
            let project = summary.project;

            match self.prune(&project).await {
                Ok(0) => debug!("Retention: nothing to drop for project \"{}\"", project.id),
                Ok(dropped) => info!(
                    "Retention: dropped {} backup(s) of project \"{}\"",
                    dropped, project.id
                ),
                Err(e) => error!(
                    "Retention: pass for project \"{}\" aborted: {}",
                    project.id, e
                ),
            }

            if let Err(e) = self.repo.refresh_status(&project.id).await {
                error!(
                    "Retention: unable to refresh status of project \"{}\": {}",
                    project.id, e
                );
            }
        }
    }

    /// Delete every backup beyond the newest `retention_count`, stopping at the first failure
    async fn prune(&self, project: &Project) -> Result<usize, BackupError> {
        let backups = self.repo.list(&project.id).await?;
        let keep = project.retention_count as usize;
        if backups.len() <= keep {
            return Ok(0);
        }

        let mut dropped = 0;
        for backup in backups.iter().skip(keep) {
            self.repo.delete(&backup.id, REASON_RETENTION).await?;
            dropped += 1;
        }
        Ok(dropped)
    }
}

#[async_trait]
impl<L: LedgerStorage + ?Sized, B: BlobStore + ?Sized> PeriodicJob for RetentionJob<L, B> {
    fn name(&self) -> &'static str {
        "retention"
    }

    async fn run_once(&self) {
        self.apply().await;
    }
}
