use crate::ledger::models::{Backup, BackupKind, BackupStatus, Project};
use chrono::{DateTime, Duration, Utc};

/// A change of a project's derived status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: BackupStatus,
    pub to: BackupStatus,
}

/// Staleness of a project given the upload time of its CURRENT backup.
///
/// An upload stamped in the future counts as fresh.
pub fn derive_status(
    check_period_seconds: u64,
    current_uploaded_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> BackupStatus {
    let Some(uploaded_at) = current_uploaded_at else {
        return BackupStatus::None;
    };

    let period = i64::try_from(check_period_seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX);
    let elapsed = now.signed_duration_since(uploaded_at);
    if elapsed <= Duration::zero() || elapsed <= period {
        BackupStatus::Ok
    } else {
        BackupStatus::Outdated
    }
}

/// Mark the first backup CURRENT and every other one ARCHIVE.
///
/// `backups` must be ordered newest first.
pub fn classify(backups: &mut [Backup]) {
    for (i, backup) in backups.iter_mut().enumerate() {
        backup.kind = if i == 0 {
            BackupKind::Current
        } else {
            BackupKind::Archive
        };
    }
}

/// Bring the derived fields of `project` in line with its CURRENT backup.
///
/// Returns the transition when the status changed; a change always clears
/// `last_notified_at`.
pub fn apply_status(
    project: &mut Project,
    current: Option<&Backup>,
    now: DateTime<Utc>,
) -> Option<StatusTransition> {
    project.last_backup_id = current.map(|b| b.id.clone());

    let status = derive_status(
        project.check_period_seconds,
        current.map(|b| b.uploaded_at),
        now,
    );
    if status == project.backup_status {
        return None;
    }

    let transition = StatusTransition {
        from: project.backup_status,
        to: status,
    };
    project.backup_status = status;
    project.last_notified_at = None;
    Some(transition)
}
