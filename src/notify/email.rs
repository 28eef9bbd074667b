use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, instrument};

use super::{Destination, Notification, Provider, ProviderError};
use crate::config::Smtp;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Email provider speaking SMTP with STARTTLS
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpProvider {
    pub fn new(config: &Smtp) -> anyhow::Result<Self> {
        let from = config.from.as_deref().unwrap_or(&config.username);
        let from: Mailbox = from
            .parse()
            .with_context(|| format!("invalid sender address `{from}`"))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .with_context(|| format!("could not set up SMTP relay {}", config.host))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self { transport, from })
    }

    pub fn build_message(
        &self,
        to: &str,
        notification: &Notification,
    ) -> Result<Message, ProviderError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| ProviderError::UnsupportedDestination(format!("{to}: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| ProviderError::Misconfigured(e.to_string()))
    }
}

#[async_trait]
impl Provider for SmtpProvider {
    fn name(&self) -> &str {
        "smtp"
    }

    #[instrument(skip(self, notification))]
    async fn send(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> Result<(), ProviderError> {
        let Destination::Email(to) = destination else {
            return Err(ProviderError::UnsupportedDestination(destination.to_string()));
        };

        let message = self.build_message(to, notification)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        debug!("sent email to {to}");
        Ok(())
    }
}
