use std::collections::HashMap;

use anyhow::bail;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::{Destination, Notification, Provider, ProviderError, check_response, http_client};
use crate::config::Telegram;
use crate::util::normalize_phone;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
}

/// Chat-bot provider using the Telegram Bot API
///
/// Owners are mapped to chats by phone number. Owners without a mapped chat
/// are notified in the default chat, with their number prefixed so the
/// operator knows whom the alert concerns.
#[derive(Debug, Clone)]
pub struct TelegramProvider {
    client: Client,
    api_base: String,
    bot_token: String,
    default_chat_id: Option<String>,
    chats: HashMap<String, String>,
}

impl TelegramProvider {
    pub fn new(config: &Telegram, chats: &HashMap<String, String>) -> anyhow::Result<Self> {
        if config.bot_token.trim().is_empty() {
            bail!("telegram bot_token must not be empty");
        }

        Ok(Self {
            client: http_client()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            default_chat_id: config.default_chat_id.clone(),
            chats: chats
                .iter()
                .map(|(phone, chat)| (normalize_phone(phone), chat.clone()))
                .collect(),
        })
    }

    /// Chat id and message text for a destination
    fn route(
        &self,
        destination: &Destination,
        body: &str,
    ) -> Result<(String, String), ProviderError> {
        if let Destination::Email(_) = destination {
            return Err(ProviderError::UnsupportedDestination(destination.to_string()));
        }

        if let Destination::Phone(phone) = destination {
            let phone = normalize_phone(phone);
            if let Some(chat) = self.chats.get(&phone) {
                return Ok((chat.clone(), body.to_string()));
            }

            let Some(default) = &self.default_chat_id else {
                return Err(ProviderError::Misconfigured(format!(
                    "no chat for {phone} and no default chat configured"
                )));
            };
            warn!("no chat mapped for {phone}, using default chat");
            return Ok((
                default.clone(),
                format!("📱 <b>Alerta para {phone}:</b>\n{body}"),
            ));
        }

        match &self.default_chat_id {
            Some(default) => Ok((default.clone(), body.to_string())),
            None => Err(ProviderError::Misconfigured(
                "no default chat configured".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Provider for TelegramProvider {
    fn name(&self) -> &str {
        "telegram"
    }

    #[instrument(skip(self, notification))]
    async fn send(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> Result<(), ProviderError> {
        let (chat_id, text) = self.route(destination, &notification.body)?;

        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: &chat_id,
                text,
                parse_mode: "HTML",
            })
            .send()
            .await?;

        check_response("telegram", response).await?;
        debug!("sent Telegram message to chat {chat_id}");
        Ok(())
    }
}
