//! Persistence gateway trait definition

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{AlertRow, ReadingRow};
use crate::classifier::SeverityTier;
use crate::events::{ActuatorEvent, Alert, OwnerContact, SensorReading};

/// Trait for persistence backends
///
/// Every operation may fail on its own. Callers log failures and keep
/// processing, so implementations must not assume that a failed insert is
/// retried or followed by anything in particular.
///
/// Implementations must be `Send + Sync` as a single gateway is shared by
/// all queue consumers and the HTTP API.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Store a reading together with its classified severity
    async fn insert_reading(
        &self,
        reading: &SensorReading,
        severity: SeverityTier,
    ) -> StorageResult<()>;

    async fn insert_actuator_event(&self, event: &ActuatorEvent) -> StorageResult<()>;

    async fn insert_alert(&self, alert: &Alert) -> StorageResult<()>;

    /// Contact of the user owning a device
    ///
    /// `Ok(None)` when the device is unknown, has no owner, or the owner has
    /// neither an email nor a phone number.
    async fn resolve_owner(&self, device_id: &str) -> StorageResult<Option<OwnerContact>>;

    /// Most recent readings of a device, newest first
    async fn recent_readings(&self, device_id: &str, limit: usize)
    -> StorageResult<Vec<ReadingRow>>;

    /// Most recent alerts of a device, newest first
    async fn recent_alerts(&self, device_id: &str, limit: usize) -> StorageResult<Vec<AlertRow>>;

    /// Lightweight check that the backend is reachable
    async fn health_check(&self) -> StorageResult<()>;
}
