//! RabbitMQ (AMQP 0.9.1) message source
//!
//! Every queue gets its own channel and a consumer with automatic
//! acknowledgement. Messages are not redelivered once received, so a payload
//! dropped by the pipeline is gone.

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info, instrument};

use crate::source::MessageSource;

/// An open broker connection
pub struct AmqpBroker {
    connection: Connection,
}

impl AmqpBroker {
    /// Connect to the broker, failure is fatal for the relay
    #[instrument(skip(url))]
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .context("could not connect to the AMQP broker")?;

        info!("connected to AMQP broker");
        Ok(Self { connection })
    }

    /// Open a channel and register a consumer on `queue`
    #[instrument(skip(self))]
    pub async fn consume(&self, queue: &str, consumer_tag: &str) -> anyhow::Result<AmqpSource> {
        let channel = self
            .connection
            .create_channel()
            .await
            .with_context(|| format!("could not open a channel for queue {queue}"))?;

        let consumer = channel
            .basic_consume(
                queue,
                &format!("{consumer_tag}-{queue}"),
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .with_context(|| format!("could not consume from queue {queue}"))?;

        info!("consuming from queue {queue}");
        Ok(AmqpSource {
            queue: queue.to_string(),
            _channel: channel,
            consumer,
        })
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        self.connection
            .close(200, "relay shutting down")
            .await
            .context("could not close the AMQP connection")
    }
}

pub struct AmqpSource {
    queue: String,
    // keeps the channel open for as long as the consumer lives
    _channel: Channel,
    consumer: Consumer,
}

#[async_trait]
impl MessageSource for AmqpSource {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn next_message(&mut self) -> Option<anyhow::Result<Bytes>> {
        let delivery = self.consumer.next().await?;
        Some(
            delivery
                .map(|delivery| {
                    debug!("delivery {} from {}", delivery.delivery_tag, self.queue);
                    Bytes::from(delivery.data)
                })
                .context("failed to receive AMQP delivery"),
        )
    }
}
