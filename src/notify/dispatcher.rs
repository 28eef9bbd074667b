//! Ordered provider fallback for a single channel

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use super::{Channel, DispatchOutcome, Destination, Notification, Provider, ProviderError};

/// Final state of a channel for one notification
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    /// A provider accepted the message
    Delivered { provider: String },

    /// Every provider failed
    Exhausted,

    /// The owner has no address for this channel, nothing was attempted
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
    pub channel: Channel,
    pub status: ChannelStatus,
    pub attempts: Vec<DispatchOutcome>,
}

impl ChannelReport {
    pub fn skipped(channel: Channel) -> Self {
        Self {
            channel,
            status: ChannelStatus::Skipped,
            attempts: Vec::new(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self.status, ChannelStatus::Delivered { .. })
    }
}

/// Tries the providers of one channel in order until one succeeds
#[derive(Clone)]
pub struct ChannelDispatcher {
    channel: Channel,
    providers: Vec<Arc<dyn Provider>>,
    timeout: Duration,
}

impl ChannelDispatcher {
    pub fn new(channel: Channel, providers: Vec<Arc<dyn Provider>>, timeout: Duration) -> Self {
        Self {
            channel,
            providers,
            timeout,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    #[instrument(skip(self, notification), fields(channel = %self.channel))]
    pub async fn dispatch(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> ChannelReport {
        let mut attempts = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            let result =
                match tokio::time::timeout(self.timeout, provider.send(destination, notification))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::Timeout(self.timeout)),
                };

            match result {
                Ok(()) => {
                    debug!("{} delivered to {destination}", provider.name());
                    attempts.push(DispatchOutcome {
                        channel: self.channel,
                        provider: provider.name().to_string(),
                        success: true,
                        error: None,
                    });

                    return ChannelReport {
                        channel: self.channel,
                        status: ChannelStatus::Delivered {
                            provider: provider.name().to_string(),
                        },
                        attempts,
                    };
                }
                Err(e) => {
                    warn!("{} failed for {destination}: {e}", provider.name());
                    attempts.push(DispatchOutcome {
                        channel: self.channel,
                        provider: provider.name().to_string(),
                        success: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        error!(
            "all {} providers of channel {} failed for {destination}",
            attempts.len(),
            self.channel
        );

        ChannelReport {
            channel: self.channel,
            status: ChannelStatus::Exhausted,
            attempts,
        }
    }
}
