use crate::backups::error::BackupError;
use crate::backups::models::{
    validate_check_period, validate_retention, BackupFile, ProjectCreateParams,
    ProjectSummary, ProjectUpdateParams, REASON_PROJECT_DELETION,
};
use crate::backups::naming::{generate_id, normalize_project_id, storage_key};
use crate::clock::Clock;
use crate::config::ProjectDefaults;
use crate::ledger::{Backup, BackupKind, LedgerStorage, Project, StatusTransition};
use crate::storage::BlobStore;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Service that owns the backup lifecycle.
///
/// Uploads go blob first, then ledger row; deletions go ledger row first,
/// then blob. Both background workers drive the ledger through this type.
pub struct BackupRepository<L: LedgerStorage + ?Sized, B: BlobStore + ?Sized> {
    ledger: Arc<L>,
    blobs: Arc<B>,
    clock: Arc<dyn Clock>,
    defaults: ProjectDefaults,
}

impl<L: LedgerStorage + ?Sized, B: BlobStore + ?Sized> Clone for BackupRepository<L, B> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            blobs: Arc::clone(&self.blobs),
            clock: Arc::clone(&self.clock),
            defaults: self.defaults,
        }
    }
}

impl<L: LedgerStorage + ?Sized, B: BlobStore + ?Sized> BackupRepository<L, B> {
    pub fn new(
        ledger: Arc<L>,
        blobs: Arc<B>,
        clock: Arc<dyn Clock>,
        defaults: ProjectDefaults,
    ) -> Self {
        Self {
            ledger,
            blobs,
            clock,
            defaults,
        }
    }

    /// Current time according to the repository's clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // Projects

    /// Register a new project
    pub async fn create_project(
        &self,
        params: ProjectCreateParams,
    ) -> Result<ProjectSummary, BackupError> {
        let id = normalize_project_id(&params.id);
        if id.is_empty() {
            return Err(BackupError::InvalidArgument(format!(
                "\"{}\" is not a valid project ID",
                params.id
            )));
        }

        let retention_count = match params.retention_count {
            Some(value) => validate_retention(value)?,
            None => self.defaults.default_retention,
        };
        let check_period_seconds = match params.check_period_seconds {
            Some(value) => validate_check_period(value)?,
            None => self.defaults.default_check_period_seconds,
        };

        let mut project = Project::new(
            id,
            params.name.trim().to_string(),
            retention_count,
            check_period_seconds,
        );
        if let Some(active) = params.active {
            project.active = active;
        }
        if let Some(notify_enabled) = params.notify_enabled {
            project.notify_enabled = notify_enabled;
        }
        if let Some(targets) = params.targets {
            project.targets = targets;
        }

        self.ledger.insert_project(project.clone()).await?;
        info!(
            "New project \"{}\" has been created (retain {}, check period {}s)",
            project.id, project.retention_count, project.check_period_seconds
        );

        Ok(ProjectSummary {
            project,
            current_backup: None,
        })
    }

    /// Change the settings of a project and re-derive its status
    pub async fn update_project(
        &self,
        id: &str,
        params: ProjectUpdateParams,
    ) -> Result<ProjectSummary, BackupError> {
        let mut project = self
            .ledger
            .get_project(id)
            .await?
            .ok_or_else(|| BackupError::ProjectNotFound(id.to_string()))?;

        params.apply_to(&mut project)?;
        self.ledger.update_project(&project).await?;
        info!("Project \"{}\" has been updated", id);

        // A new check period can change staleness right away
        self.refresh_status(id).await?;
        self.get_project(id).await
    }

    /// Delete a project together with all of its backups
    pub async fn delete_project(&self, id: &str) -> Result<(), BackupError> {
        if self.ledger.get_project(id).await?.is_none() {
            return Err(BackupError::ProjectNotFound(id.to_string()));
        }

        for backup in self.ledger.list_backups(id).await? {
            self.delete(&backup.id, REASON_PROJECT_DELETION).await?;
        }

        self.ledger.delete_project(id).await?;
        info!("Project \"{}\" has been deleted", id);
        Ok(())
    }

    /// A project with its derived status and CURRENT backup
    pub async fn get_project(&self, id: &str) -> Result<ProjectSummary, BackupError> {
        let project = self
            .ledger
            .get_project(id)
            .await?
            .ok_or_else(|| BackupError::ProjectNotFound(id.to_string()))?;
        let current_backup = self.ledger.current_backup(id).await?;

        Ok(ProjectSummary {
            project,
            current_backup,
        })
    }

    /// All projects ordered by id
    pub async fn list_projects(&self) -> Result<Vec<ProjectSummary>, BackupError> {
        let projects = self.ledger.list_projects().await?;
        let mut summaries = Vec::with_capacity(projects.len());

        for project in projects {
            let current_backup = self.ledger.current_backup(&project.id).await?;
            summaries.push(ProjectSummary {
                project,
                current_backup,
            });
        }

        Ok(summaries)
    }

    // Backups

    /// Store a new backup of an active project
    pub async fn upload(
        &self,
        project_id: &str,
        file_name: &str,
        data: Bytes,
    ) -> Result<Backup, BackupError> {
        let project = self.ledger.get_project(project_id).await?;
        match project {
            Some(project) if project.active => {}
            Some(_) => {
                warn!("Rejected upload to inactive project \"{}\"", project_id);
                return Err(BackupError::AccessDenied(project_id.to_string()));
            }
            None => {
                warn!("Rejected upload to unknown project \"{}\"", project_id);
                return Err(BackupError::AccessDenied(project_id.to_string()));
            }
        }

        let now = self.clock.now();
        let size_bytes = data.len() as u64;
        let key = storage_key(project_id, file_name, now);

        let storage_ref = self.blobs.put(&key, data).await?;
        debug!("Backup payload written to {}", storage_ref);

        let backup = Backup {
            id: generate_id(),
            project_id: project_id.to_string(),
            file_name: file_name.to_string(),
            storage_ref,
            uploaded_at: now,
            size_bytes,
            kind: BackupKind::Current,
        };

        match self.ledger.insert_backup(backup.clone(), now).await {
            Ok(stored) => {
                info!(
                    "New backup \"{}\" (project \"{}\") has been uploaded ({} bytes, see \"{}\")",
                    stored.id, stored.project_id, stored.size_bytes, stored.storage_ref
                );
                Ok(stored)
            }
            Err(e) => {
                warn!(
                    "Blob \"{}\" is orphaned: backup \"{}\" could not be recorded: {}",
                    backup.storage_ref, backup.id, e
                );
                Err(e.into())
            }
        }
    }

    /// Backups of a project, newest first
    pub async fn list(&self, project_id: &str) -> Result<Vec<Backup>, BackupError> {
        Ok(self.ledger.list_backups(project_id).await?)
    }

    /// A backup record and its payload
    pub async fn download(&self, id: &str) -> Result<BackupFile, BackupError> {
        let backup = self
            .ledger
            .get_backup(id)
            .await?
            .ok_or_else(|| BackupError::BackupNotFound(id.to_string()))?;
        let data = self.blobs.get(&backup.storage_ref).await?;

        Ok(BackupFile { backup, data })
    }

    /// Delete a backup: the row first, then its blob.
    ///
    /// When the blob cannot be removed the row is already gone; the leaked key
    /// is logged and the error returned.
    pub async fn delete(&self, id: &str, reason: &str) -> Result<Backup, BackupError> {
        let backup = self.ledger.delete_backup(id, self.clock.now()).await?;

        if let Err(e) = self.blobs.delete(&backup.storage_ref).await {
            error!(
                "Backup \"{}\" (project \"{}\") was removed from the ledger but blob \"{}\" leaked: {}",
                backup.id, backup.project_id, backup.storage_ref, e
            );
            return Err(e.into());
        }

        info!(
            "Backup \"{}\" (project \"{}\") has been deleted {}",
            backup.id, backup.project_id, reason
        );
        Ok(backup)
    }

    // Derived state

    /// Re-derive a project's status against the current time
    pub async fn refresh_status(
        &self,
        project_id: &str,
    ) -> Result<Option<StatusTransition>, BackupError> {
        Ok(self
            .ledger
            .refresh_status(project_id, self.clock.now())
            .await?)
    }

    /// Record that a staleness alert went out at `at`
    pub async fn mark_notified(
        &self,
        project_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), BackupError> {
        Ok(self.ledger.set_last_notified(project_id, at).await?)
    }

    // Orphans

    /// Blob keys no backup row references
    pub async fn find_orphans(&self) -> Result<BTreeSet<String>, BackupError> {
        let keys = self.blobs.list().await?;
        let referenced = self.ledger.all_storage_refs().await?;

        Ok(keys.difference(&referenced).cloned().collect())
    }

    /// Delete every orphaned blob, returning the removed keys
    pub async fn remove_orphans(&self) -> Result<Vec<String>, BackupError> {
        let mut removed = Vec::new();

        for key in self.find_orphans().await? {
            self.blobs.delete(&key).await?;
            warn!("Orphaned blob \"{}\" has been removed", key);
            removed.push(key);
        }

        Ok(removed)
    }
}
