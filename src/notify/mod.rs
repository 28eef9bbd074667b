//! Notification channels and provider backends
//!
//! A [`Channel`] is a category of transport (chat bot, email, SMS, voice
//! message). Each channel owns an ordered list of [`Provider`]s, concrete
//! backends that all expose the same `send` contract. The
//! [`dispatcher::ChannelDispatcher`] walks that list until one provider
//! succeeds.
//!
//! ## Backends
//!
//! - **telegram**: Telegram bot API (chat bot)
//! - **discord**: Discord webhook (chat bot)
//! - **email**: SMTP via lettre
//! - **sms**: Vonage SMS API
//! - **whatsapp**: Green-API WhatsApp gateway (voice message)
//! - **webhook**: generic JSON webhook, usable in any channel

pub mod discord;
pub mod dispatcher;
pub mod email;
pub mod sms;
pub mod telegram;
pub mod webhook;
pub mod whatsapp;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::{ContactsConfig, ProviderConfig};
use crate::events::OwnerContact;

/// Timeout of the HTTP clients used by the providers
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    ChatBot,
    Email,
    Sms,
    VoiceMessage,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::ChatBot,
        Channel::Email,
        Channel::Sms,
        Channel::VoiceMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::ChatBot => "chat_bot",
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::VoiceMessage => "voice_message",
        }
    }

    /// Where to deliver on this channel, `None` if the contact lacks the attribute
    ///
    /// The chat bot can always post to its default chat, so it never needs a
    /// phone number.
    pub fn destination(&self, contact: &OwnerContact) -> Option<Destination> {
        match self {
            Channel::ChatBot => Some(
                contact
                    .phone
                    .clone()
                    .map_or(Destination::Unaddressed, Destination::Phone),
            ),
            Channel::Email => contact.email.clone().map(Destination::Email),
            Channel::Sms | Channel::VoiceMessage => contact.phone.clone().map(Destination::Phone),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "address", rename_all = "snake_case")]
pub enum Destination {
    Phone(String),
    Email(String),
    /// No personal address, the provider's default target is used
    Unaddressed,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Phone(phone) => write!(f, "phone {phone}"),
            Destination::Email(email) => write!(f, "email {email}"),
            Destination::Unaddressed => f.write_str("default target"),
        }
    }
}

/// Message text rendered for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
}

/// Errors a provider can report for one send attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// The attempt did not finish in time
    Timeout(Duration),

    /// Network or protocol failure before a response was received
    Transport(String),

    /// The backend answered but refused the message
    Rejected(String),

    /// The provider cannot deliver to this kind of destination
    UnsupportedDestination(String),

    /// Missing or unusable provider configuration
    Misconfigured(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Timeout(after) => write!(f, "timed out after {}s", after.as_secs_f32()),
            ProviderError::Transport(msg) => write!(f, "transport error: {}", msg),
            ProviderError::Rejected(msg) => write!(f, "rejected: {}", msg),
            ProviderError::UnsupportedDestination(msg) => {
                write!(f, "unsupported destination: {}", msg)
            }
            ProviderError::Misconfigured(msg) => write!(f, "misconfigured: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// A backend able to deliver a notification
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used in logs and dispatch reports
    fn name(&self) -> &str;

    async fn send(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> Result<(), ProviderError>;
}

/// Result of one provider attempt
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub channel: Channel,
    pub provider: String,
    pub success: bool,
    pub error: Option<String>,
}

pub(crate) fn http_client() -> anyhow::Result<Client> {
    Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// Ensure a non-2xx response becomes a `Rejected` error carrying the body
pub(crate) async fn check_response(
    backend: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Rejected(format!(
        "{backend} responded with {status}: {body}"
    )))
}

/// Instantiate a provider from its configuration
pub fn build_provider(
    config: &ProviderConfig,
    contacts: &ContactsConfig,
) -> anyhow::Result<Arc<dyn Provider>> {
    let provider: Arc<dyn Provider> = match config {
        ProviderConfig::Telegram(telegram) => Arc::new(telegram::TelegramProvider::new(
            telegram,
            &contacts.telegram_chats,
        )?),
        ProviderConfig::Discord(discord) => Arc::new(discord::DiscordProvider::new(discord)?),
        ProviderConfig::Smtp(smtp) => Arc::new(email::SmtpProvider::new(smtp)?),
        ProviderConfig::Vonage(vonage) => Arc::new(sms::VonageProvider::new(vonage)?),
        ProviderConfig::GreenApi(green_api) => {
            Arc::new(whatsapp::GreenApiProvider::new(green_api)?)
        }
        ProviderConfig::Webhook(webhook) => Arc::new(webhook::WebhookProvider::new(webhook)?),
    };

    Ok(provider)
}
