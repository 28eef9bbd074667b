use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument};

use super::{Destination, Notification, Provider, ProviderError, check_response, http_client};
use crate::config::GreenApi;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessage<'a> {
    chat_id: String,
    message: &'a str,
}

/// WhatsApp chat id for a phone number, digits only
fn chat_id(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}@c.us")
}

/// Voice-message provider backed by the Green-API WhatsApp gateway
#[derive(Debug, Clone)]
pub struct GreenApiProvider {
    client: Client,
    api_base: String,
    instance_id: String,
    token: String,
}

impl GreenApiProvider {
    pub fn new(config: &GreenApi) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            instance_id: config.instance_id.clone(),
            token: config.token.clone(),
        })
    }
}

#[async_trait]
impl Provider for GreenApiProvider {
    fn name(&self) -> &str {
        "green_api"
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

        let url = format!(
            "{}/waInstance{}/SendMessage/{}",
            self.api_base, self.instance_id, self.token
        );
        let response = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: chat_id(phone),
                message: &notification.body,
            })
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            return Err(ProviderError::Rejected(format!(
                "green-api instance {} refused the request, check that it is authorized and the token is valid",
                self.instance_id
            )));
        }

        check_response("green_api", response).await?;
        debug!("sent WhatsApp message to {phone}");
        Ok(())
    }
}
