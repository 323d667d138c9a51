use crate::ledger::error::LedgerError;
use crate::ledger::ledger_storage::LedgerStorage;
use crate::ledger::models::{Backup, Project};
use crate::ledger::status::{apply_status, classify, StatusTransition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct FakeState {
    projects: BTreeMap<String, Project>,
    // Insertion order breaks ties between equal upload times, like SQLite's rowid
    backups: Vec<Backup>,
}

impl FakeState {
    fn backups_newest_first(&self, project_id: &str) -> Vec<Backup> {
        let mut backups: Vec<(usize, Backup)> = self
            .backups
            .iter()
            .enumerate()
            .filter(|(_, b)| b.project_id == project_id)
            .map(|(i, b)| (i, b.clone()))
            .collect();
        backups.sort_by(|(ia, a), (ib, b)| {
            b.uploaded_at
                .cmp(&a.uploaded_at)
                .then_with(|| ib.cmp(ia))
        });
        backups.into_iter().map(|(_, b)| b).collect()
    }

    fn rederive(
        &mut self,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, LedgerError> {
        let mut ordered = self.backups_newest_first(project_id);
        classify(&mut ordered);
        for classified in &ordered {
            if let Some(stored) = self.backups.iter_mut().find(|b| b.id == classified.id) {
                stored.kind = classified.kind;
            }
        }

        let project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| LedgerError::ProjectNotFound(project_id.to_string()))?;
        Ok(apply_status(project, ordered.first(), now))
    }
}

/// A fake in-memory implementation of the LedgerStorage trait for testing
#[derive(Clone, Default)]
pub struct FakeLedgerStorage {
    state: Arc<RwLock<FakeState>>,
    fail_backup_inserts: Arc<AtomicBool>,
}

impl FakeLedgerStorage {
    /// Create a new empty FakeLedgerStorage
    pub fn new() -> Self {
        Self::default()
    }

    /// After calling this, every `insert_backup` fails without changing state
    pub fn fake_fail_backup_inserts(&self, fail: bool) {
        self.fail_backup_inserts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStorage for FakeLedgerStorage {
    async fn insert_project(&self, project: Project) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        if state.projects.contains_key(&project.id) {
            return Err(LedgerError::ProjectExists(project.id));
        }
        state.projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn update_project(&self, project: &Project) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        let stored = state
            .projects
            .get_mut(&project.id)
            .ok_or_else(|| LedgerError::ProjectNotFound(project.id.clone()))?;
        stored.name = project.name.clone();
        stored.retention_count = project.retention_count;
        stored.check_period_seconds = project.check_period_seconds;
        stored.active = project.active;
        stored.notify_enabled = project.notify_enabled;
        stored.targets = project.targets.clone();
        Ok(())
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, LedgerError> {
        Ok(self.state.read().unwrap().projects.get(id).cloned())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, LedgerError> {
        Ok(self.state.read().unwrap().projects.values().cloned().collect())
    }

    async fn delete_project(&self, id: &str) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        if !state.projects.contains_key(id) {
            return Err(LedgerError::ProjectNotFound(id.to_string()));
        }
        if state.backups.iter().any(|b| b.project_id == id) {
            return Err(LedgerError::OperationError(format!(
                "Project {id} still has backups"
            )));
        }
        state.projects.remove(id);
        Ok(())
    }

    async fn set_last_notified(&self, id: &str, at: DateTime<Utc>) -> Result<(), LedgerError> {
        let mut state = self.state.write().unwrap();
        let project = state
            .projects
            .get_mut(id)
            .ok_or_else(|| LedgerError::ProjectNotFound(id.to_string()))?;
        project.last_notified_at = Some(at);
        Ok(())
    }

    async fn insert_backup(
        &self,
        backup: Backup,
        now: DateTime<Utc>,
    ) -> Result<Backup, LedgerError> {
        if self.fail_backup_inserts.load(Ordering::SeqCst) {
            return Err(LedgerError::OperationError(
                "simulated insert failure".to_string(),
            ));
        }

        let mut state = self.state.write().unwrap();
        if !state.projects.contains_key(&backup.project_id) {
            return Err(LedgerError::ProjectNotFound(backup.project_id));
        }
        if state
            .backups
            .iter()
            .any(|b| b.id == backup.id || b.storage_ref == backup.storage_ref)
        {
            return Err(LedgerError::OperationError(format!(
                "Duplicate backup {}",
                backup.id
            )));
        }

        let id = backup.id.clone();
        let project_id = backup.project_id.clone();
        state.backups.push(backup);
        state.rederive(&project_id, now)?;

        state
            .backups
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(LedgerError::BackupNotFound(id))
    }

    async fn delete_backup(&self, id: &str, now: DateTime<Utc>) -> Result<Backup, LedgerError> {
        let mut state = self.state.write().unwrap();
        let position = state
            .backups
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| LedgerError::BackupNotFound(id.to_string()))?;

        let backup = state.backups.remove(position);
        state.rederive(&backup.project_id, now)?;
        Ok(backup)
    }

    async fn get_backup(&self, id: &str) -> Result<Option<Backup>, LedgerError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .backups
            .iter()
            .find(|b| b.id == id)
            .cloned())
    }

    async fn list_backups(&self, project_id: &str) -> Result<Vec<Backup>, LedgerError> {
        Ok(self.state.read().unwrap().backups_newest_first(project_id))
    }

    async fn current_backup(&self, project_id: &str) -> Result<Option<Backup>, LedgerError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .backups_newest_first(project_id)
            .into_iter()
            .next())
    }

    async fn refresh_status(
        &self,
        project_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, LedgerError> {
        self.state.write().unwrap().rederive(project_id, now)
    }

    async fn all_storage_refs(&self) -> Result<BTreeSet<String>, LedgerError> {
        Ok(self
            .state
            .read()
            .unwrap()
            .backups
            .iter()
            .map(|b| b.storage_ref.clone())
            .collect())
    }
}
