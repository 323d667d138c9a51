use crate::backups::{BackupRepository, ProjectSummary};
use crate::ledger::{BackupStatus, LedgerStorage, Project};
use crate::policy::notifier::{AlertMessage, Notifier, NotifyError};
use crate::policy::periodic::PeriodicJob;
use crate::storage::BlobStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Whether a staleness alert is due for `project` at `now`.
///
/// `cooldown` is the alert frequency plus the quiet period.
pub fn should_notify(project: &Project, now: DateTime<Utc>, cooldown: Duration) -> bool {
    if !project.active || !project.notify_enabled {
        return false;
    }
    if project.backup_status != BackupStatus::Outdated {
        return false;
    }

    match project.last_notified_at {
        None => true,
        Some(at) => now.signed_duration_since(at) >= cooldown,
    }
}

/// Chat message for a stale project
pub fn alert_message(summary: &ProjectSummary) -> AlertMessage {
    let project = &summary.project;
    let mut text = format!(
        "No backups of {} ({}) were taken in a while. Please review and take actions.",
        project.id, project.name
    );
    if let Some(current) = &summary.current_backup {
        text.push_str(&format!(
            " Last backup was uploaded at {}.",
            current.uploaded_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }

    AlertMessage {
        title: format!("{} backup warning", project.id),
        text,
        emoji: "warning".to_string(),
    }
}

/// JSON body posted to webhooks for a stale project
pub fn webhook_payload(summary: &ProjectSummary) -> Value {
    let mut payload = Map::new();
    payload.insert("project".to_string(), json!(summary.project.id));
    if let Some(current) = &summary.current_backup {
        payload.insert("lastBackupTime".to_string(), json!(current.uploaded_at));
    }
    Value::Object(payload)
}

/// Sends debounced alerts for projects whose backups went stale
pub struct NotificationJob<L: LedgerStorage + ?Sized, B: BlobStore + ?Sized, N: Notifier + ?Sized>
{
    repo: Arc<BackupRepository<L, B>>,
    notifier: Arc<N>,
    cooldown: Duration,
}

impl<L, B, N> NotificationJob<L, B, N>
where
    L: LedgerStorage + ?Sized,
    B: BlobStore + ?Sized,
    N: Notifier + ?Sized,
{
    pub fn new(repo: Arc<BackupRepository<L, B>>, notifier: Arc<N>, cooldown: Duration) -> Self {
        Self {
            repo,
            notifier,
            cooldown,
        }
    }

    /// One pass over all projects
    pub async fn apply(&self) {
        let summaries = match self.repo.list_projects().await {
            Ok(summaries) => summaries,
            Err(e) => {
                error!("Notification: unable to list projects: {}", e);
                return;
            }
        };

        for summary in summaries {
            let id = summary.project.id;

            // Staleness only shows up once status is re-derived against the clock
            if let Err(e) = self.repo.refresh_status(&id).await {
                error!("Notification: unable to refresh status of \"{}\": {}", id, e);
                continue;
            }
            let summary = match self.repo.get_project(&id).await {
                Ok(summary) => summary,
                Err(e) => {
                    error!("Notification: unable to load project \"{}\": {}", id, e);
                    continue;
                }
            };

            let now = self.repo.now();
            if !should_notify(&summary.project, now, self.cooldown) {
                continue;
            }

            if let Err(e) = self.dispatch(&summary).await {
                error!("Notification: alert for project \"{}\" not delivered: {}", id, e);
                continue;
            }

            match self.repo.mark_notified(&id, now).await {
                Ok(()) => info!("Notification: stale backup alert sent for project \"{}\"", id),
                Err(e) => error!(
                    "Notification: alert for \"{}\" sent but not recorded: {}",
                    id, e
                ),
            }
        }
    }

    /// Send on every channel with recipients, in order, stopping at the first failure
    async fn dispatch(&self, summary: &ProjectSummary) -> Result<(), NotifyError> {
        let targets = &summary.project.targets;
        let message = alert_message(summary);

        if !targets.slack.is_empty() {
            self.notifier.notify_slack(&targets.slack, &message).await?;
        }
        if !targets.telegram.is_empty() {
            self.notifier
                .notify_telegram(&targets.telegram, &message)
                .await?;
        }
        if !targets.webhook.is_empty() {
            self.notifier
                .notify_webhook(&targets.webhook, &webhook_payload(summary))
                .await?;
        }

        debug!("Notification dispatched for project \"{}\"", summary.project.id);
        Ok(())
    }
}

#[async_trait]
impl<L, B, N> PeriodicJob for NotificationJob<L, B, N>
where
    L: LedgerStorage + ?Sized,
    B: BlobStore + ?Sized,
    N: Notifier + ?Sized,
{
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn run_once(&self) {
        self.apply().await;
    }
}
