use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use super::{Destination, Notification, Provider, ProviderError, check_response, http_client};
use crate::config::Discord;

/// Embed colour for critical alerts
const ALERT_COLOR: u32 = 15158332;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Discord speaks markdown, not HTML
fn to_markdown(text: &str) -> String {
    crate::util::strip_markup(&text.replace("<b>", "**").replace("</b>", "**"))
}

/// Chat-bot provider posting to a Discord webhook
#[derive(Debug, Clone)]
pub struct DiscordProvider {
    client: Client,
    url: String,
    user_id: Option<String>,
}

impl DiscordProvider {
    pub fn new(config: &Discord) -> anyhow::Result<Self> {
        Ok(Self {
            client: http_client()?,
            url: config.url.clone(),
            user_id: config.user_id.clone(),
        })
    }

    pub fn build_message(&self, destination: &Destination, notification: &Notification) -> Message {
        let footer = match destination {
            Destination::Unaddressed => "EasyGrow".to_string(),
            other => format!("EasyGrow | {other}"),
        };

        let embed = Embed {
            title: Some(notification.subject.clone()),
            description: Some(to_markdown(&notification.body)),
            color: Some(ALERT_COLOR),
            footer: Some(EmbedFooter { text: footer }),
            timestamp: Some(Utc::now().to_rfc3339()),
        };

        let mut builder = MessageBuilder::new().add_embed(embed);
        if let Some(user_id) = &self.user_id {
            builder = builder.content(format!("<@{user_id}>"));
        }
        builder.build()
    }
}

#[async_trait]
impl Provider for DiscordProvider {
    fn name(&self) -> &str {
        "discord"
    }

    #[instrument(skip(self, notification))]
    async fn send(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> Result<(), ProviderError> {
        let message = self.build_message(destination, notification);
        let response = self.client.post(&self.url).json(&message).send().await?;
        check_response("discord", response).await?;
        debug!("sent Discord message");
        Ok(())
    }
}
