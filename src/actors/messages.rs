//! Message types exchanged with the actors

use serde::Serialize;
use tokio::sync::oneshot;

use crate::pipeline::{AlertStatus, MessageOutcome};

/// Commands accepted by a ConsumerActor
#[derive(Debug)]
pub enum ConsumerCommand {
    /// Report the counters of this consumer
    GetStats {
        respond_to: oneshot::Sender<ConsumerStats>,
    },

    /// Stop consuming, the message being processed is finished first
    Shutdown,
}

/// Counters of one queue consumer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    pub queue: String,

    /// Payloads received (and relayed to viewers)
    pub received: u64,

    pub readings: u64,
    pub actuator_events: u64,
    pub unrecognized: u64,
    pub undecodable: u64,

    /// Critical readings whose fan-out was started
    pub alerts_dispatched: u64,

    /// Failed receives from the source
    pub receive_errors: u64,
}

impl ConsumerStats {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &MessageOutcome) {
        self.received += 1;
        match outcome {
            MessageOutcome::Undecodable(_) => self.undecodable += 1,
            MessageOutcome::Unrecognized => self.unrecognized += 1,
            MessageOutcome::Reading { alert, .. } => {
                self.readings += 1;
                if let AlertStatus::Dispatched(_) = alert {
                    self.alerts_dispatched += 1;
                }
            }
            MessageOutcome::Actuator { .. } => self.actuator_events += 1,
        }
    }
}
