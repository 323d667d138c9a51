use crate::backups::{BackupRepository, ProjectCreateParams};
use crate::clock::{Clock, ManualClock};
use crate::config::{load_config, Config, ProjectDefaults};
use crate::ledger::models::{NotificationTargets, Project};
use crate::ledger::{Backup, BackupStatus, FakeLedgerStorage, LedgerStorage};
use crate::storage::FakeBlobStore;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;

/// Check if a test is enabled via environment variable
fn is_test_enabled(env_var: &str) -> bool {
    std::env::var(env_var)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Check if S3 tests are enabled via environment variable
pub fn is_s3_enabled() -> bool {
    is_test_enabled("ENABLE_S3_TESTS")
}

/// Load test configuration from config.toml
pub fn load_test_config() -> Result<Config, anyhow::Error> {
    load_config("config.toml").map_err(|e| anyhow::anyhow!("Failed to load config.toml: {}", e))
}

/// Fixed starting point for tests that drive a manual clock
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Creates an active project with no backups and notifications enabled
///
/// Other fields can be customized after creation if needed
pub fn create_test_project(id: &str) -> Project {
    Project {
        id: id.to_string(),
        name: format!("Project {id}"),
        retention_count: 10,
        check_period_seconds: 3600,
        active: true,
        notify_enabled: true,
        targets: NotificationTargets {
            slack: vec!["@ops".to_string()],
            telegram: vec!["12345".to_string()],
            webhook: vec!["https://hooks.example.com/backup".to_string()],
        },
        backup_status: BackupStatus::None,
        last_backup_id: None,
        last_notified_at: None,
    }
}

/// Repository wired to fakes and a manual clock
pub struct TestEnvironment {
    pub ledger: Arc<FakeLedgerStorage>,
    pub blobs: Arc<FakeBlobStore>,
    pub clock: Arc<ManualClock>,
    pub repo: BackupRepository<FakeLedgerStorage, FakeBlobStore>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let ledger = Arc::new(FakeLedgerStorage::new());
        let blobs = Arc::new(FakeBlobStore::new());
        let clock = Arc::new(ManualClock::new(test_epoch()));
        let repo = BackupRepository::new(
            Arc::clone(&ledger),
            Arc::clone(&blobs),
            Arc::clone(&clock) as Arc<dyn Clock>,
            ProjectDefaults::default(),
        );

        Self {
            ledger,
            blobs,
            clock,
            repo,
        }
    }

    /// Register an active project with notifications on every channel
    pub async fn create_project(&self, id: &str, retention: i64, check_period: i64) {
        let targets = create_test_project(id).targets;
        self.repo
            .create_project(ProjectCreateParams {
                id: id.to_string(),
                name: format!("Project {id}"),
                retention_count: Some(retention),
                check_period_seconds: Some(check_period),
                active: Some(true),
                notify_enabled: Some(true),
                targets: Some(targets),
            })
            .await
            .unwrap();
    }

    /// Move the clock to `at` and upload a backup there
    pub async fn upload_at(&self, project_id: &str, at: DateTime<Utc>) -> Backup {
        self.clock.set(at);
        self.repo
            .upload(project_id, "dump.sql.gz", Bytes::from(format!("payload {at}")))
            .await
            .unwrap()
    }

    /// Verify that a backup exists in the ledger and its blob in the store
    pub async fn verify_backup_stored(&self, backup: &Backup) -> Result<(), String> {
        let record = self
            .ledger
            .get_backup(&backup.id)
            .await
            .map_err(|e| format!("Failed to get backup: {}", e))?;
        if record.is_none() {
            return Err(format!("Backup {} not found in ledger", backup.id));
        }

        if !self.blobs.fake_contains(&backup.storage_ref).await {
            return Err(format!(
                "Blob {} of backup {} not found in blob store",
                backup.storage_ref, backup.id
            ));
        }
        Ok(())
    }

    /// Verify that neither the backup row nor its blob remains
    pub async fn verify_backup_gone(&self, backup: &Backup) -> Result<(), String> {
        let record = self
            .ledger
            .get_backup(&backup.id)
            .await
            .map_err(|e| format!("Failed to get backup: {}", e))?;
        if record.is_some() {
            return Err(format!("Backup {} still present in ledger", backup.id));
        }

        if self.blobs.fake_contains(&backup.storage_ref).await {
            return Err(format!(
                "Blob {} of backup {} still present in blob store",
                backup.storage_ref, backup.id
            ));
        }
        Ok(())
    }
}
