use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{Destination, Notification, Provider, ProviderError, check_response, http_client};
use crate::config::Vonage;

#[derive(Debug, Serialize)]
struct SmsRequest<'a> {
    api_key: &'a str,
    api_secret: &'a str,
    from: &'a str,
    to: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SmsResponse {
    #[serde(default)]
    messages: Vec<SmsStatus>,
}

#[derive(Debug, Deserialize)]
struct SmsStatus {
    status: String,
    #[serde(rename = "error-text")]
    error_text: Option<String>,
}

/// SMS provider backed by the Vonage (Nexmo) SMS API
#[derive(Debug, Clone)]
pub struct VonageProvider {
    client: Client,
    api_base: String,
    api_key: String,
    api_secret: String,
    from: String,
}

impl VonageProvider {
    pub fn new(config: &Vonage) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Provider for VonageProvider {
    fn name(&self) -> &str {
        "vonage"
    }

    #[instrument(skip(self, notification))]
    async fn send(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> Result<(), ProviderError> {
        let Destination::Phone(phone) = destination else {
            return Err(ProviderError::UnsupportedDestination(destination.to_string()));
        };

        let response = self
            .client
            .post(format!("{}/sms/json", self.api_base))
            .json(&SmsRequest {
                api_key: &self.api_key,
                api_secret: &self.api_secret,
                from: &self.from,
                to: phone.trim_start_matches('+'),
                text: &notification.body,
            })
            .send()
            .await?;

        let response: SmsResponse = check_response("vonage", response).await?.json().await?;

        // Vonage answers 200 and reports failures per message
        match response.messages.first() {
            Some(status) if status.status == "0" => {
                debug!("sent SMS to {phone}");
                Ok(())
            }
            Some(status) => Err(ProviderError::Rejected(format!(
                "vonage status {}: {}",
                status.status,
                status.error_text.as_deref().unwrap_or("unknown error")
            ))),
            None => Err(ProviderError::Rejected(
                "vonage returned no message status".to_string(),
            )),
        }
    }
}
