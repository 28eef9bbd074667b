//! ConsumerActor - drives the pipeline for one queue
//!
//! ## Message Flow
//!
//! ```text
//! MessageSource → RawMessage → Pipeline::handle → (relay, decode, persist, classify, alert)
//!      ↑
//!      └─── Commands (GetStats, Shutdown)
//! ```
//!
//! Messages of one queue are handled strictly one after another. Alert
//! fan-out runs on detached tasks, so a slow provider never holds up the
//! next message.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::events::RawMessage;
use crate::pipeline::Pipeline;
use crate::source::MessageSource;

use super::messages::{ConsumerCommand, ConsumerStats};

/// Actor consuming a single queue
pub struct ConsumerActor<S> {
    source: S,
    pipeline: Arc<Pipeline>,
    command_rx: mpsc::Receiver<ConsumerCommand>,
    stats: ConsumerStats,
}

impl<S: MessageSource> ConsumerActor<S> {
    pub fn new(
        source: S,
        pipeline: Arc<Pipeline>,
        command_rx: mpsc::Receiver<ConsumerCommand>,
    ) -> Self {
        let stats = ConsumerStats::new(source.queue());
        Self {
            source,
            pipeline,
            command_rx,
            stats,
        }
    }

    /// Run until shutdown or until the source closes
    #[instrument(skip(self), fields(queue = %self.stats.queue))]
    pub async fn run(mut self) -> ConsumerStats {
        debug!("starting consumer actor");

        loop {
            tokio::select! {
                biased;

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ConsumerCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats.clone());
                        }
                        ConsumerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                next = self.source.next_message() => {
                    match next {
                        Some(Ok(payload)) => {
                            let message = RawMessage::new(self.stats.queue.clone(), payload);
                            let outcome = self.pipeline.handle(message).await;
                            self.stats.record(&outcome);
                        }
                        Some(Err(e)) => {
                            self.stats.receive_errors += 1;
                            error!("failed to receive message: {e:#}");
                        }
                        None => {
                            warn!("message source closed, stopping consumer");
                            break;
                        }
                    }
                }
            }
        }

        debug!("consumer actor stopped after {} messages", self.stats.received);
        self.stats
    }
}

/// Handle for controlling a ConsumerActor
pub struct ConsumerHandle {
    sender: mpsc::Sender<ConsumerCommand>,
    stopped: watch::Receiver<bool>,
    task: JoinHandle<ConsumerStats>,
    pub queue: String,
}

impl ConsumerHandle {
    /// Spawn a consumer for `source` on its own task
    pub fn spawn<S>(source: S, pipeline: Arc<Pipeline>) -> Self
    where
        S: MessageSource + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (stopped_tx, stopped_rx) = watch::channel(false);
        let queue = source.queue().to_string();

        let actor = ConsumerActor::new(source, pipeline, cmd_rx);
        let task = tokio::spawn(async move {
            let stats = actor.run().await;
            let _ = stopped_tx.send(true);
            stats
        });

        Self {
            sender: cmd_tx,
            stopped: stopped_rx,
            task,
            queue,
        }
    }

    pub async fn stats(&self) -> Result<ConsumerStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ConsumerCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive stats")
    }

    /// Ask the actor to stop, a consumer that already stopped is fine
    pub async fn shutdown(&self) {
        if self.sender.send(ConsumerCommand::Shutdown).await.is_err() {
            debug!("consumer for {} already stopped", self.queue);
        }
    }

    /// Resolves once the actor has left its loop
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        let _ = stopped.wait_for(|stopped| *stopped).await;
    }

    /// Wait for the actor task and return its final counters
    pub async fn wait(self) -> Result<ConsumerStats> {
        self.task
            .await
            .with_context(|| format!("consumer task for {} failed", self.queue))
    }
}
