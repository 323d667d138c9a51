use crate::policy::notifier::{AlertMessage, Channel, Notifier, NotifyError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// One recorded send attempt
#[derive(Debug, Clone, PartialEq)]
pub struct SentAlert {
    pub channel: Channel,
    pub to: Vec<String>,
    pub message: Option<AlertMessage>,
    pub payload: Option<serde_json::Value>,
}

/// `FakeNotifier` records every send and can be told to fail one channel
#[derive(Clone, Default)]
pub struct FakeNotifier {
    sent: Arc<Mutex<Vec<SentAlert>>>,
    attempts: Arc<Mutex<Vec<Channel>>>,
    failing: Arc<Mutex<Option<Channel>>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send on `channel` fail, or clear the failure with `None`
    pub fn fake_fail_channel(&self, channel: Option<Channel>) {
        *self.failing.lock().unwrap() = channel;
    }

    /// Successful sends in order
    pub fn sent(&self) -> Vec<SentAlert> {
        self.sent.lock().unwrap().clone()
    }

    /// Every channel a send was attempted on, including failures
    pub fn attempts(&self) -> Vec<Channel> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
        self.attempts.lock().unwrap().clear();
    }

    fn record(&self, alert: SentAlert) -> Result<(), NotifyError> {
        self.attempts.lock().unwrap().push(alert.channel);
        if *self.failing.lock().unwrap() == Some(alert.channel) {
            return Err(NotifyError::SendFailed(
                alert.channel,
                "simulated delivery failure".to_string(),
            ));
        }
        self.sent.lock().unwrap().push(alert);
        Ok(())
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify_slack(
        &self,
        to: &[String],
        message: &AlertMessage,
    ) -> Result<(), NotifyError> {
        self.record(SentAlert {
            channel: Channel::Slack,
            to: to.to_vec(),
            message: Some(message.clone()),
            payload: None,
        })
    }

    async fn notify_telegram(
        &self,
        to: &[String],
        message: &AlertMessage,
    ) -> Result<(), NotifyError> {
        self.record(SentAlert {
            channel: Channel::Telegram,
            to: to.to_vec(),
            message: Some(message.clone()),
            payload: None,
        })
    }

    async fn notify_webhook(
        &self,
        to: &[String],
        payload: &serde_json::Value,
    ) -> Result<(), NotifyError> {
        self.record(SentAlert {
            channel: Channel::Webhook,
            to: to.to_vec(),
            message: None,
            payload: Some(payload.clone()),
        })
    }
}
