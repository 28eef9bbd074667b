//! API response types

use serde::{Deserialize, Serialize};

use crate::storage::{AlertRow, ReadingRow};

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the storage backend is unreachable
    pub status: String,
    pub service: String,
    pub version: String,
    pub queues: Vec<String>,

    /// Currently connected WebSocket viewers
    pub viewers: usize,

    /// `ok` or the storage error
    pub storage: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadingsResponse {
    pub device_id: String,
    pub count: usize,
    pub readings: Vec<ReadingRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertsResponse {
    pub device_id: String,
    pub count: usize,
    pub alerts: Vec<AlertRow>,
}
