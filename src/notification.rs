//! Failure Notifications
//!
//! Best-effort publishing of a (title, message) pair to a notification
//! topic. Publishing never fails the caller: errors are logged and dropped.

use crate::error::ApiError;
use crate::instance::Command;
use crate::oci::client::OciClient;
use crate::reconciler::Action;
use async_trait::async_trait;
use serde_json::json;

/// Publishes a message to a channel (an OCI notification topic)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, title: &str, body: &str) -> Result<(), ApiError>;
}

/// What went wrong, used to build the notification title
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    StatusCheckFailed,
    CommandFailed(Command),
    TimedOut(Command),
    Skipped(Action),
}

impl NotificationKind {
    pub fn title(&self) -> String {
        match self {
            Self::StatusCheckFailed => "Container Instance Status Check Failed".to_string(),
            Self::CommandFailed(cmd) => {
                format!("Container Instance {} Command Failed", cmd.display_name())
            }
            Self::TimedOut(cmd) => format!("Container Instance {} Timed Out", cmd.display_name()),
            Self::Skipped(action) => {
                format!("Container Instance {} Skipped", action.display_name())
            }
        }
    }
}

/// Publish unless no channel is configured. Never returns an error.
pub async fn notify(notifier: &dyn Notifier, channel: Option<&str>, title: &str, message: &str) {
    let Some(channel) = channel.map(str::trim).filter(|c| !c.is_empty()) else {
        tracing::debug!("No notification channel configured, skipping '{}'", title);
        return;
    };

    match notifier.publish(channel, title, message).await {
        Ok(()) => tracing::info!("Notification sent: {}", title),
        Err(e) => tracing::warn!("Failed to send notification '{}': {}", title, e),
    }
}

/// Message body: the outcome plus where and when
pub fn notification_body(resource_id: &str, message: &str) -> String {
    format!(
        "{}\n\nResource: {}\nTime: {}",
        message,
        resource_id,
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    )
}

#[async_trait]
impl Notifier for OciClient {
    async fn publish(&self, channel: &str, title: &str, body: &str) -> Result<(), ApiError> {
        let url = self.topic_messages_url(channel);
        let payload = json!({ "title": title, "body": body });
        self.post(&url, Some(&payload)).await.map(|_| ())
    }
}
