use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Delivery channel of a staleness alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Slack,
    Telegram,
    Webhook,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Slack => "slack",
            Channel::Telegram => "telegram",
            Channel::Webhook => "webhook",
        })
    }
}

/// Errors that can occur while dispatching a notification
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to send {0} notification: {1}")]
    SendFailed(Channel, String),
}

/// Human-readable alert for chat channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMessage {
    pub title: String,
    pub text: String,
    pub emoji: String,
}

/// Notifier trait defining the three independent send operations
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Send a chat alert to Slack users or channels
    async fn notify_slack(&self, to: &[String], message: &AlertMessage)
        -> Result<(), NotifyError>;

    /// Send a chat alert to Telegram chats
    async fn notify_telegram(
        &self,
        to: &[String],
        message: &AlertMessage,
    ) -> Result<(), NotifyError>;

    /// POST a JSON payload to each webhook URL
    async fn notify_webhook(
        &self,
        to: &[String],
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Implementation of Notifier trait for Arc<T> where T implements Notifier
#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn notify_slack(
        &self,
        to: &[String],
        message: &AlertMessage,
    ) -> Result<(), NotifyError> {
        (**self).notify_slack(to, message).await
    }

    async fn notify_telegram(
        &self,
        to: &[String],
        message: &AlertMessage,
    ) -> Result<(), NotifyError> {
        (**self).notify_telegram(to, message).await
    }

    async fn notify_webhook(
        &self,
        to: &[String],
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        (**self).notify_webhook(to, payload).await
    }
}

/// Notifier that writes every alert to the log.
///
/// Stands in for the chat and webhook senders, which live outside this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_slack(
        &self,
        to: &[String],
        message: &AlertMessage,
    ) -> Result<(), NotifyError> {
        info!(
            channel = %Channel::Slack,
            recipients = ?to,
            ":{}: {}: {}",
            message.emoji,
            message.title,
            message.text
        );
        Ok(())
    }

    async fn notify_telegram(
        &self,
        to: &[String],
        message: &AlertMessage,
    ) -> Result<(), NotifyError> {
        info!(
            channel = %Channel::Telegram,
            recipients = ?to,
            ":{}: {}: {}",
            message.emoji,
            message.title,
            message.text
        );
        Ok(())
    }

    async fn notify_webhook(
        &self,
        to: &[String],
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        info!(channel = %Channel::Webhook, recipients = ?to, "{}", payload);
        Ok(())
    }
}
