//! API shared state

use std::sync::Arc;

use crate::hub::BroadcastHub;
use crate::storage::PersistenceGateway;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Live payload fan-out, every WebSocket viewer subscribes here
    pub hub: BroadcastHub,

    /// Backend for the history endpoints
    pub gateway: Arc<dyn PersistenceGateway>,

    /// Queues consumed by this relay, reported by `/health`
    pub queues: Arc<[String]>,
}

impl ApiState {
    pub fn new(
        hub: BroadcastHub,
        gateway: Arc<dyn PersistenceGateway>,
        queues: impl Into<Arc<[String]>>,
    ) -> Self {
        Self {
            hub,
            gateway,
            queues: queues.into(),
        }
    }
}
