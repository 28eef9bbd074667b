//! Event types carried through the ingestion pipeline
//!
//! Messages arrive as opaque JSON payloads. The routing rule is field based and
//! independent of the queue a message came from:
//!
//! ```text
//! has "evento"            → ActuatorEvent
//! else has "valor"        → SensorReading
//! else                    → Unrecognized (relayed, then dropped)
//! ```

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::classifier::SeverityTier;

/// A message exactly as it was received from the broker
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Queue the message was consumed from
    pub queue: String,

    /// Unmodified payload
    pub payload: Bytes,

    /// When the consumer received the message
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(queue: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            queue: queue.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// A single sensor reading published by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub mac_address: String,

    /// Sensor kind, free text (e.g. "sensor de temperatura")
    pub nombre: String,

    pub valor: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fecha: Option<String>,
}

impl SensorReading {
    /// Timestamp reported by the device, or `fallback` if absent or unparsable
    pub fn recorded_at(&self, fallback: DateTime<Utc>) -> DateTime<Utc> {
        self.fecha
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(fallback)
    }
}

/// An actuator state change (pump on/off, valve, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorEvent {
    pub mac_address: String,

    /// Event label, e.g. "Bomba A activada"
    pub evento: String,

    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub bomba: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_sensor: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valor_humedad: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiempo_encendida_seg: Option<f64>,
}

/// Outcome of decoding a payload
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingEvent {
    Reading(SensorReading),
    Actuator(ActuatorEvent),
    Unrecognized,
}

impl IncomingEvent {
    /// Decode and route a raw payload
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

        let Some(object) = value.as_object() else {
            return Ok(IncomingEvent::Unrecognized);
        };

        if object.contains_key("evento") {
            let event: ActuatorEvent = serde_json::from_value(value)
                .map_err(|e| DecodeError::InvalidShape(e.to_string()))?;
            require_non_empty("mac_address", &event.mac_address)?;
            require_non_empty("evento", &event.evento)?;
            return Ok(IncomingEvent::Actuator(event));
        }

        if object.contains_key("valor") {
            let reading: SensorReading = serde_json::from_value(value)
                .map_err(|e| DecodeError::InvalidShape(e.to_string()))?;
            require_non_empty("mac_address", &reading.mac_address)?;
            require_non_empty("nombre", &reading.nombre)?;
            return Ok(IncomingEvent::Reading(reading));
        }

        Ok(IncomingEvent::Unrecognized)
    }
}

/// Contact details of the person responsible for a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerContact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl OwnerContact {
    /// Build a contact, treating blank values as absent
    pub fn new(email: Option<String>, phone: Option<String>) -> Self {
        let present = |value: Option<String>| value.filter(|v| !v.trim().is_empty());
        Self {
            email: present(email),
            phone: present(phone),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }
}

/// A critical condition detected on a reading
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub device_id: String,
    pub sensor: String,
    pub value: f64,
    pub severity: SeverityTier,

    /// Rich (HTML) alert text
    pub message: String,

    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn from_reading(reading: &SensorReading, severity: SeverityTier) -> Self {
        let created_at = Utc::now();
        let message = format!(
            "🚨 <b>ALERTA CRÍTICA</b>\n\
             📍 <b>Dispositivo:</b> {}\n\
             📊 <b>Sensor:</b> {}\n\
             ⚠️ <b>Valor:</b> {:.2}\n\
             🕐 <b>Fecha:</b> {}\n\n\
             🔧 Revisa tu sistema EasyGrow inmediatamente",
            reading.mac_address,
            reading.nombre,
            reading.valor,
            created_at.format("%Y-%m-%d %H:%M:%S"),
        );

        Self {
            device_id: reading.mac_address.clone(),
            sensor: reading.nombre.clone(),
            value: reading.valor,
            severity,
            message,
            created_at,
        }
    }
}

/// Errors produced while decoding a payload
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload is not valid JSON
    InvalidJson(String),

    /// JSON does not match the routed event shape
    InvalidShape(String),

    /// A required text field is empty
    EmptyField(&'static str),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidJson(msg) => write!(f, "invalid JSON: {}", msg),
            DecodeError::InvalidShape(msg) => write!(f, "unexpected message shape: {}", msg),
            DecodeError::EmptyField(field) => write!(f, "required field `{}` is empty", field),
        }
    }
}

impl std::error::Error for DecodeError {}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), DecodeError> {
    if value.trim().is_empty() {
        return Err(DecodeError::EmptyField(field));
    }
    Ok(())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Devices send the pump identifier either as a string or as a number
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
