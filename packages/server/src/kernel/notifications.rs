use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info};

use super::{BaseNotificationService, Notification};

/// Notification channel reached over an HTTP webhook.
/// Posts `{ userId, template, payload }` as JSON.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl BaseNotificationService for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            user_id = %notification.user_id,
            template = %notification.template,
            "Sending notification"
        );

        let response = self.client.post(&self.url).json(notification).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Notification webhook rejected message");
            return Err(anyhow!("notification webhook returned {}", status));
        }

        Ok(())
    }
}

/// Used when no webhook is configured: the notification is only logged.
pub struct LogNotifier;

#[async_trait]
impl BaseNotificationService for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            user_id = %notification.user_id,
            template = %notification.template,
            payload = %notification.payload,
            "Notification (no channel configured)"
        );
        Ok(())
    }
}
