//! Live fan-out of raw payloads to connected viewers
//!
//! Every subscriber owns a bounded queue. Publishing never waits: a payload is
//! offered to each queue with `try_send`, and a subscriber whose queue is full
//! (too slow) or closed (gone) is removed on the spot.
//!
//! There is no history. A subscriber only sees payloads published after it
//! subscribed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace, warn};

/// Default per-subscriber queue capacity
pub const DEFAULT_VIEWER_BUFFER: usize = 256;

pub type SubscriberId = u64;

#[derive(Debug)]
struct HubInner {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<Bytes>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl HubInner {
    fn subscribers(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<Bytes>>> {
        // a panic while holding the lock cannot leave the map half-updated
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publish/subscribe registry for raw payloads
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner.subscribers().insert(id, tx);
        debug!("viewer {id} subscribed");

        Subscription {
            id,
            receiver: rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber, returns whether it was still registered
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.subscribers().remove(&id).is_some();
        if removed {
            debug!("viewer {id} unsubscribed");
        }
        removed
    }

    /// Offer a payload to every subscriber, returns the number it was queued for
    pub fn publish(&self, payload: Bytes) -> usize {
        let mut subscribers = self.inner.subscribers();
        let mut delivered = 0;

        subscribers.retain(|id, sender| match sender.try_send(payload.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("viewer {id} is not keeping up, dropping it");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("viewer {id} is gone, removing it");
                false
            }
        });

        trace!("published {} bytes to {delivered} viewers", payload.len());
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWER_BUFFER)
    }
}

/// Receiving end of a hub subscription
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Bytes>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next payload, `None` once the hub dropped this subscriber
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.subscribers().remove(&self.id);
        }
    }
}
