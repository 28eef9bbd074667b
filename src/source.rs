//! Where queue consumers get their messages from

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// A stream of raw payloads from one queue
///
/// `next_message` must be cancel safe: the consumer polls it inside
/// `tokio::select!` next to its command channel.
#[async_trait]
pub trait MessageSource: Send {
    /// Name of the queue this source reads from
    fn queue(&self) -> &str;

    /// Next payload, an `Err` for a failed receive, `None` once the source is closed
    async fn next_message(&mut self) -> Option<anyhow::Result<Bytes>>;
}

/// Source fed through an in-process channel
pub struct ChannelSource {
    queue: String,
    receiver: mpsc::Receiver<anyhow::Result<Bytes>>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it
    pub fn new(
        queue: impl Into<String>,
        capacity: usize,
    ) -> (mpsc::Sender<anyhow::Result<Bytes>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                queue: queue.into(),
                receiver: rx,
            },
        )
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    fn queue(&self) -> &str {
        &self.queue
    }

    async fn next_message(&mut self) -> Option<anyhow::Result<Bytes>> {
        self.receiver.recv().await
    }
}
