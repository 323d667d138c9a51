use crate::ledger::error::LedgerError;
use crate::ledger::models::{Backup, Project};
use crate::ledger::status::StatusTransition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// LedgerStorage trait defining the persistent record of projects and their backups
///
/// Every method is a single transaction. Methods that add or remove a backup
/// also re-establish the CURRENT backup and the project's derived status
/// before committing.
#[async_trait]
pub trait LedgerStorage: Send + Sync + 'static {
    /// Register a new project, failing with `ProjectExists` on a duplicate id
    async fn insert_project(&self, project: Project) -> Result<(), LedgerError>;

    /// Overwrite the settings of an existing project. Derived fields are left untouched.
    async fn update_project(&self, project: &Project) -> Result<(), LedgerError>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>, LedgerError>;

    /// All projects ordered by id
    async fn list_projects(&self) -> Result<Vec<Project>, LedgerError>;

    /// Remove a project row. The project must have no backups left.
    async fn delete_project(&self, id: &str) -> Result<(), LedgerError>;

    /// Record that a staleness alert was sent
    async fn set_last_notified(&self, id: &str, at: DateTime<Utc>) -> Result<(), LedgerError>;

    /// Insert a backup row and re-derive its project.
    ///
    /// Returns the stored row with its derived kind.
    async fn insert_backup(&self, backup: Backup, now: DateTime<Utc>)
        -> Result<Backup, LedgerError>;

    /// Delete a backup row and re-derive its project.
    ///
    /// Returns the deleted row so the caller can release its blob.
    async fn delete_backup(&self, id: &str, now: DateTime<Utc>) -> Result<Backup, LedgerError>;

    async fn get_backup(&self, id: &str) -> Result<Option<Backup>, LedgerError>;

    /// Backups of a project, newest first. Unknown projects have none.
    async fn list_backups(&self, project_id: &str) -> Result<Vec<Backup>, LedgerError>;

    async fn current_backup(&self, project_id: &str) -> Result<Option<Backup>, LedgerError>;

    /// Re-derive a project's status against `now` without touching its backups
    async fn refresh_status(
        &self,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, LedgerError>;

    /// Every blob key referenced by a backup row
    async fn all_storage_refs(&self) -> Result<BTreeSet<String>, LedgerError>;
}

/// Implementation of LedgerStorage trait for Arc<T> where T implements LedgerStorage
#[async_trait]
impl<T: LedgerStorage + ?Sized> LedgerStorage for Arc<T> {
    async fn insert_project(&self, project: Project) -> Result<(), LedgerError> {
        (**self).insert_project(project).await
    }

    async fn update_project(&self, project: &Project) -> Result<(), LedgerError> {
        (**self).update_project(project).await
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, LedgerError> {
        (**self).get_project(id).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, LedgerError> {
        (**self).list_projects().await
    }

    async fn delete_project(&self, id: &str) -> Result<(), LedgerError> {
        (**self).delete_project(id).await
    }

    async fn set_last_notified(&self, id: &str, at: DateTime<Utc>) -> Result<(), LedgerError> {
        (**self).set_last_notified(id, at).await
    }

    async fn insert_backup(
        &self,
        backup: Backup,
        now: DateTime<Utc>,
    ) -> Result<Backup, LedgerError> {
        (**self).insert_backup(backup, now).await
    }

    async fn delete_backup(&self, id: &str, now: DateTime<Utc>) -> Result<Backup, LedgerError> {
        (**self).delete_backup(id, now).await
    }

    async fn get_backup(&self, id: &str) -> Result<Option<Backup>, LedgerError> {
        (**self).get_backup(id).await
    }

    async fn list_backups(&self, project_id: &str) -> Result<Vec<Backup>, LedgerError> {
        (**self).list_backups(project_id).await
    }

    async fn current_backup(&self, project_id: &str) -> Result<Option<Backup>, LedgerError> {
        (**self).current_backup(project_id).await
    }

    async fn refresh_status(
        &self,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, LedgerError> {
        (**self).refresh_status(project_id, now).await
    }

    async fn all_storage_refs(&self) -> Result<BTreeSet<String>, LedgerError> {
        (**self).all_storage_refs().await
    }
}
