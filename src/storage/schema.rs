//! Row types shared by the storage backends

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classifier::SeverityTier;
use crate::events::{ActuatorEvent, Alert, SensorReading};

/// A persisted sensor reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingRow {
    pub device_id: String,
    pub sensor: String,
    pub value: f64,
    pub severity: SeverityTier,
    pub recorded_at: DateTime<Utc>,
}

impl ReadingRow {
    pub fn from_reading(
        reading: &SensorReading,
        severity: SeverityTier,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: reading.mac_address.clone(),
            sensor: reading.nombre.clone(),
            value: reading.valor,
            severity,
            recorded_at: reading.recorded_at(received_at),
        }
    }
}

/// A persisted actuator event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorEventRow {
    pub device_id: String,
    pub label: String,
    pub actuator: Option<String>,
    pub sensor_id: Option<i64>,
    pub humidity: Option<f64>,
    pub runtime_secs: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl ActuatorEventRow {
    pub fn from_event(event: &ActuatorEvent, recorded_at: DateTime<Utc>) -> Self {
        Self {
            device_id: event.mac_address.clone(),
            label: event.evento.clone(),
            actuator: event.bomba.clone(),
            sensor_id: event.id_sensor,
            humidity: event.valor_humedad,
            runtime_secs: event.tiempo_encendida_seg,
            recorded_at,
        }
    }
}

/// A persisted alert
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRow {
    pub device_id: String,
    pub sensor: String,
    pub value: f64,
    pub severity: SeverityTier,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Alert> for AlertRow {
    fn from(alert: &Alert) -> Self {
        Self {
            device_id: alert.device_id.clone(),
            sensor: alert.sensor.clone(),
            value: alert.value,
            severity: alert.severity,
            message: alert.message.clone(),
            created_at: alert.created_at,
        }
    }
}
