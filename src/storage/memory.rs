//! In-memory persistence gateway
//!
//! Used when storage is configured as `none` and throughout the tests.
//! Readings, alerts and actuator events are each kept in a bounded ring per
//! device, so memory use stays flat no matter how long the relay runs.
//! Owners are registered up front with [`MemoryGateway::register_device`],
//! from the `storage.owners` table when configured as `none`.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::backend::PersistenceGateway;
use super::error::StorageResult;
use super::schema::{ActuatorEventRow, AlertRow, ReadingRow};
use crate::classifier::SeverityTier;
use crate::events::{ActuatorEvent, Alert, OwnerContact, SensorReading};

/// Maximum readings to keep in memory per device
const MAX_READINGS_PER_DEVICE: usize = 1000;

/// Maximum alerts and actuator events to keep in memory per device
const MAX_EVENTS_PER_DEVICE: usize = 500;

type Rings<T> = HashMap<String, VecDeque<T>>;

fn push_bounded<T>(rings: &mut Rings<T>, device_id: &str, row: T, capacity: usize) {
    let ring = rings.entry(device_id.to_string()).or_default();
    if ring.len() == capacity {
        ring.pop_front();
    }
    ring.push_back(row);
}

#[derive(Default)]
struct MemoryState {
    readings: Rings<ReadingRow>,
    actuator_events: Rings<ActuatorEventRow>,
    alerts: Rings<AlertRow>,

    /// Known devices, `None` when no owner is assigned
    devices: HashMap<String, Option<OwnerContact>>,
}

#[derive(Default)]
pub struct MemoryGateway {
    state: RwLock<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and its owner contact
    pub async fn register_device(&self, device_id: impl Into<String>, owner: Option<OwnerContact>) {
        self.state.write().await.devices.insert(device_id.into(), owner);
    }

    /// All stored alerts, grouped by device, oldest first within a device
    pub async fn alerts(&self) -> Vec<AlertRow> {
        self.state.read().await.alerts.values().flatten().cloned().collect()
    }

    /// All stored actuator events, grouped by device, oldest first within a device
    pub async fn actuator_events(&self) -> Vec<ActuatorEventRow> {
        self.state
            .read()
            .await
            .actuator_events
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    pub async fn reading_count(&self) -> usize {
        self.state.read().await.readings.values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn insert_reading(
        &self,
        reading: &SensorReading,
        severity: SeverityTier,
    ) -> StorageResult<()> {
        let row = ReadingRow::from_reading(reading, severity, Utc::now());
        let mut state = self.state.write().await;
        push_bounded(
            &mut state.readings,
            &reading.mac_address,
            row,
            MAX_READINGS_PER_DEVICE,
        );
        Ok(())
    }

    async fn insert_actuator_event(&self, event: &ActuatorEvent) -> StorageResult<()> {
        let row = ActuatorEventRow::from_event(event, Utc::now());
        let mut state = self.state.write().await;
        push_bounded(
            &mut state.actuator_events,
            &event.mac_address,
            row,
            MAX_EVENTS_PER_DEVICE,
        );
        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> StorageResult<()> {
        let mut state = self.state.write().await;
        push_bounded(
            &mut state.alerts,
            &alert.device_id,
            AlertRow::from(alert),
            MAX_EVENTS_PER_DEVICE,
        );
        Ok(())
    }

    async fn resolve_owner(&self, device_id: &str) -> StorageResult<Option<OwnerContact>> {
        let state = self.state.read().await;
        let Some(owner) = state.devices.get(device_id) else {
            debug!("device {device_id} is not registered");
            return Ok(None);
        };

        let Some(contact) = owner else {
            debug!("device {device_id} has no owner assigned");
            return Ok(None);
        };

        if contact.is_empty() {
            warn!("owner of {device_id} has neither email nor phone");
            return Ok(None);
        }

        if contact.phone.is_none() {
            warn!("owner of {device_id} has no phone number configured");
        }

        Ok(Some(contact.clone()))
    }

    async fn recent_readings(
        &self,
        device_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<ReadingRow>> {
        let state = self.state.read().await;
        Ok(state
            .readings
            .get(device_id)
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn recent_alerts(&self, device_id: &str, limit: usize) -> StorageResult<Vec<AlertRow>> {
        let state = self.state.read().await;
        Ok(state
            .alerts
            .get(device_id)
            .map(|ring| ring.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
