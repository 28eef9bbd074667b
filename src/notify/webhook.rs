use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

use super::{Destination, Notification, Provider, ProviderError, check_response, http_client};
use crate::config::Webhook;

/// Generic JSON webhook, accepts any destination
#[derive(Debug, Clone)]
pub struct WebhookProvider {
    client: Client,
    url: String,
}

impl WebhookProvider {
    pub fn new(config: &Webhook) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, notification))]
    async fn send(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> Result<(), ProviderError> {
        let payload = json!({
            "message": notification.body,
            "subject": notification.subject,
            "destination": destination,
            "timestamp": Utc::now().to_rfc3339()
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        check_response("webhook", response).await?;
        debug!("sent webhook notification");
        Ok(())
    }
}
