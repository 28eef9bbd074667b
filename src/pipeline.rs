//! Per-message processing
//!
//! ```text
//! RawMessage ─► hub.publish ─► decode ─┬─ Reading  ─► classify ─► persist ─► (Critical) alert
//!                                      ├─ Actuator ─► persist ─► (policy) chat-bot notice
//!                                      └─ Unrecognized ─► drop
//! ```
//!
//! Publishing to viewers always happens first and is never skipped, so
//! viewers see every payload even when it cannot be decoded or stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::alerts::{AlertFanout, FanoutReport};
use crate::classifier::{Classifier, SeverityTier};
use crate::config::ActuatorNotifyPolicy;
use crate::events::{ActuatorEvent, Alert, DecodeError, IncomingEvent, RawMessage, SensorReading};
use crate::hub::BroadcastHub;
use crate::notify::dispatcher::ChannelReport;
use crate::storage::PersistenceGateway;

/// What happened to the alert of a reading
#[derive(Debug)]
pub enum AlertStatus {
    /// The reading was not critical
    NotRaised,

    /// Critical, but no owner contact could be found
    NoOwner,

    /// Critical, owner lookup failed
    ResolutionFailed,

    /// Fan-out running on a detached task
    Dispatched(JoinHandle<FanoutReport>),
}

/// Result of handling one message
#[derive(Debug)]
pub enum MessageOutcome {
    /// Payload could not be decoded, it was only relayed
    Undecodable(DecodeError),

    /// Valid JSON without a known shape, it was only relayed
    Unrecognized,

    Reading {
        severity: SeverityTier,
        alert: AlertStatus,
    },

    Actuator {
        notice: Option<JoinHandle<ChannelReport>>,
    },
}

/// Decides which actuator events produce a chat-bot notice
#[derive(Debug)]
struct ActuatorGate {
    policy: ActuatorNotifyPolicy,
    last_notice: Mutex<HashMap<(String, String), Instant>>,
}

impl ActuatorGate {
    fn new(policy: ActuatorNotifyPolicy) -> Self {
        Self {
            policy,
            last_notice: Mutex::new(HashMap::new()),
        }
    }

    fn admit(&self, event: &ActuatorEvent) -> bool {
        let window = match self.policy {
            ActuatorNotifyPolicy::Always => return true,
            ActuatorNotifyPolicy::Never => return false,
            ActuatorNotifyPolicy::Window { window_secs } => Duration::from_secs(window_secs),
        };

        let now = Instant::now();
        let key = (event.mac_address.clone(), event.evento.clone());
        let mut last_notice = self
            .last_notice
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last_notice.retain(|_, last| now.duration_since(*last) < window);

        match last_notice.get(&key) {
            Some(last) if now.duration_since(*last) < window => false,
            _ => {
                last_notice.insert(key, now);
                true
            }
        }
    }
}

pub struct Pipeline {
    hub: BroadcastHub,
    gateway: Arc<dyn PersistenceGateway>,
    classifier: Classifier,
    fanout: Arc<AlertFanout>,
    actuator_gate: ActuatorGate,
}

impl Pipeline {
    pub fn new(
        hub: BroadcastHub,
        gateway: Arc<dyn PersistenceGateway>,
        classifier: Classifier,
        fanout: Arc<AlertFanout>,
        actuator_policy: ActuatorNotifyPolicy,
    ) -> Self {
        Self {
            hub,
            gateway,
            classifier,
            fanout,
            actuator_gate: ActuatorGate::new(actuator_policy),
        }
    }

    #[instrument(skip(self, message), fields(queue = %message.queue, bytes = message.payload.len()))]
    pub async fn handle(&self, message: RawMessage) -> MessageOutcome {
        let relayed = self.hub.publish(message.payload.clone());
        trace!("relayed payload to {relayed} viewers");

        match IncomingEvent::decode(&message.payload) {
            Ok(IncomingEvent::Reading(reading)) => self.handle_reading(reading).await,
            Ok(IncomingEvent::Actuator(event)) => self.handle_actuator(event).await,
            Ok(IncomingEvent::Unrecognized) => {
                warn!("dropping message without `evento` or `valor`");
                MessageOutcome::Unrecognized
            }
            Err(e) => {
                warn!("dropping undecodable message: {e}");
                MessageOutcome::Undecodable(e)
            }
        }
    }

    async fn handle_reading(&self, reading: SensorReading) -> MessageOutcome {
        let severity = self.classifier.classify(&reading.nombre, reading.valor);
        debug!(
            "{} {} = {:.2} → {severity}",
            reading.mac_address, reading.nombre, reading.valor
        );

        if let Err(e) = self.gateway.insert_reading(&reading, severity).await {
            error!("could not persist reading of {}: {e}", reading.mac_address);
        }

        let alert = if severity == SeverityTier::Critical {
            self.raise_alert(&reading, severity).await
        } else {
            AlertStatus::NotRaised
        };

        MessageOutcome::Reading { severity, alert }
    }

    async fn raise_alert(&self, reading: &SensorReading, severity: SeverityTier) -> AlertStatus {
        let alert = Alert::from_reading(reading, severity);

        if let Err(e) = self.gateway.insert_alert(&alert).await {
            error!("could not persist alert of {}: {e}", alert.device_id);
        }

        match self.gateway.resolve_owner(&alert.device_id).await {
            Ok(Some(contact)) => {
                info!(
                    "critical {} on {}, notifying owner",
                    alert.sensor, alert.device_id
                );
                AlertStatus::Dispatched(self.fanout.spawn(contact, alert))
            }
            Ok(None) => {
                warn!("no owner contact for {}, alert not sent", alert.device_id);
                AlertStatus::NoOwner
            }
            Err(e) => {
                error!("owner lookup for {} failed: {e}", alert.device_id);
                AlertStatus::ResolutionFailed
            }
        }
    }

    async fn handle_actuator(&self, event: ActuatorEvent) -> MessageOutcome {
        debug!("{} actuator event: {}", event.mac_address, event.evento);

        if let Err(e) = self.gateway.insert_actuator_event(&event).await {
            error!(
                "could not persist actuator event of {}: {e}",
                event.mac_address
            );
        }

        if !self.actuator_gate.admit(&event) {
            trace!("actuator notice suppressed by policy");
            return MessageOutcome::Actuator { notice: None };
        }

        let notice = match self.gateway.resolve_owner(&event.mac_address).await {
            Ok(Some(contact)) => self.fanout.spawn_actuator_notice(contact, event),
            Ok(None) => {
                debug!("no owner for {}, skipping actuator notice", event.mac_address);
                None
            }
            Err(e) => {
                warn!("owner lookup for {} failed: {e}", event.mac_address);
                None
            }
        };

        MessageOutcome::Actuator { notice }
    }
}
