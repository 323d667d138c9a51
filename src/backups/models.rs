use crate::backups::error::BackupError;
use crate::ledger::{Backup, NotificationTargets, Project};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Reason logged when a user deletes a backup
pub const REASON_USER: &str = "by user";
/// Reason logged when retention prunes a backup
pub const REASON_RETENTION: &str = "by retention policy";
/// Reason logged when a backup goes with its project
pub const REASON_PROJECT_DELETION: &str = "by project deletion";

/// Parameters for registering a project. Unset values take configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectCreateParams {
    pub id: String,
    pub name: String,
    pub retention_count: Option<i64>,
    pub check_period_seconds: Option<i64>,
    pub active: Option<bool>,
    pub notify_enabled: Option<bool>,
    pub targets: Option<NotificationTargets>,
}

/// Partial update of project settings. Unset values are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectUpdateParams {
    pub name: Option<String>,
    pub retention_count: Option<i64>,
    pub check_period_seconds: Option<i64>,
    pub active: Option<bool>,
    pub notify_enabled: Option<bool>,
    pub targets: Option<NotificationTargets>,
}

impl ProjectUpdateParams {
    /// Apply the set values to `project`. An empty name is ignored.
    pub fn apply_to(&self, project: &mut Project) -> Result<(), BackupError> {
        if let Some(name) = self.name.as_deref().map(str::trim) {
            if !name.is_empty() {
                project.name = name.to_string();
            }
        }
        if let Some(retention) = self.retention_count {
            project.retention_count = validate_retention(retention)?;
        }
        if let Some(period) = self.check_period_seconds {
            project.check_period_seconds = validate_check_period(period)?;
        }
        if let Some(active) = self.active {
            project.active = active;
        }
        if let Some(notify_enabled) = self.notify_enabled {
            project.notify_enabled = notify_enabled;
        }
        if let Some(targets) = &self.targets {
            project.targets = targets.clone();
        }
        Ok(())
    }
}

pub(crate) fn validate_retention(value: i64) -> Result<u32, BackupError> {
    u32::try_from(value).map_err(|_| {
        BackupError::InvalidArgument(format!("\"{value}\" is not a valid backup retention"))
    })
}

pub(crate) fn validate_check_period(value: i64) -> Result<u64, BackupError> {
    u64::try_from(value).map_err(|_| {
        BackupError::InvalidArgument(format!("\"{value}\" is not a valid backup check period"))
    })
}

/// A project together with its CURRENT backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub current_backup: Option<Backup>,
}

/// A backup record and its payload
#[derive(Debug, Clone)]
pub struct BackupFile {
    pub backup: Backup,
    pub data: Bytes,
}
