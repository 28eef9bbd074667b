//! Persistence of readings, actuator events and alerts
//!
//! The [`PersistenceGateway`] trait hides the backend from the pipeline and
//! the HTTP API.
//!
//! ## Backends
//!
//! - **SQLite** (default): embedded database, also holds the device/owner
//!   tables used for alert routing
//! - **In-Memory**: no persistence, for `backend: "none"` and tests

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;
use crate::events::OwnerContact;

pub use backend::PersistenceGateway;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryGateway;
pub use schema::{ActuatorEventRow, AlertRow, ReadingRow};

/// Open the configured backend
pub async fn open_gateway(config: &StorageConfig) -> anyhow::Result<Arc<dyn PersistenceGateway>> {
    match config {
        StorageConfig::None { owners } => {
            info!("using in-memory storage, nothing is persisted");
            let gateway = MemoryGateway::new();
            for (device_id, contact) in owners {
                let contact = OwnerContact::new(contact.email.clone(), contact.phone.clone());
                gateway.register_device(device_id, Some(contact)).await;
            }
            if !owners.is_empty() {
                info!("registered {} device owners", owners.len());
            }
            Ok(Arc::new(gateway))
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => {
            let gateway = sqlite::SqliteGateway::new(path).await?;
            Ok(Arc::new(gateway))
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("SQLite storage requested but the `storage-sqlite` feature is disabled")
        }
    }
}
