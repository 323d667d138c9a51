use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of a backup within its project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupKind {
    /// The newest backup of the project
    Current,
    /// Any older backup
    Archive,
}

impl BackupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupKind::Current => "CURRENT",
            BackupKind::Archive => "ARCHIVE",
        }
    }
}

impl FromStr for BackupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CURRENT" => Ok(BackupKind::Current),
            "ARCHIVE" => Ok(BackupKind::Archive),
            _ => Err(format!("Invalid backup kind: {s}")),
        }
    }
}

/// Staleness status derived from a project's CURRENT backup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackupStatus {
    /// The project has no backups
    None,
    /// The CURRENT backup is within the check period
    Ok,
    /// The CURRENT backup is older than the check period
    Outdated,
}

impl BackupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupStatus::None => "NONE",
            BackupStatus::Ok => "OK",
            BackupStatus::Outdated => "OUTDATED",
        }
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(BackupStatus::None),
            "OK" => Ok(BackupStatus::Ok),
            "OUTDATED" => Ok(BackupStatus::Outdated),
            _ => Err(format!("Invalid backup status: {s}")),
        }
    }
}

/// Notification recipients grouped by channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTargets {
    #[serde(default)]
    pub slack: Vec<String>,
    #[serde(default)]
    pub telegram: Vec<String>,
    #[serde(default)]
    pub webhook: Vec<String>,
}

impl NotificationTargets {
    pub fn is_empty(&self) -> bool {
        self.slack.is_empty() && self.telegram.is_empty() && self.webhook.is_empty()
    }
}

/// A project whose backups are tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Normalized slug, unique
    pub id: String,
    pub name: String,
    /// How many of the newest backups survive a retention pass
    pub retention_count: u32,
    /// Maximum age of the CURRENT backup before the project is OUTDATED
    pub check_period_seconds: u64,
    pub active: bool,
    pub notify_enabled: bool,
    pub targets: NotificationTargets,
    /// Derived, never written by project updates
    pub backup_status: BackupStatus,
    /// Id of the CURRENT backup, if any. Derived.
    pub last_backup_id: Option<String>,
    /// When the last staleness alert went out. Cleared on every status change.
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Create a project with no backups and nothing derived yet
    pub fn new(id: String, name: String, retention_count: u32, check_period_seconds: u64) -> Self {
        Self {
            id,
            name,
            retention_count,
            check_period_seconds,
            active: true,
            notify_enabled: false,
            targets: NotificationTargets::default(),
            backup_status: BackupStatus::None,
            last_backup_id: None,
            last_notified_at: None,
        }
    }
}

/// Metadata record of one uploaded backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub id: String,
    pub project_id: String,
    /// Name supplied by the uploader
    pub file_name: String,
    /// Blob store key holding the payload
    pub storage_ref: String,
    pub uploaded_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub kind: BackupKind,
}
