//! SQLite persistence gateway
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (the HTTP API) do not block consumer writes
//! - **Migrations**: Schema versioned with sqlx from `./migrations`
//!
//! Timestamps are stored as Unix milliseconds.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument, warn};

use super::backend::PersistenceGateway;
use super::error::{StorageError, StorageResult};
use super::schema::{ActuatorEventRow, AlertRow, ReadingRow};
use crate::classifier::SeverityTier;
use crate::events::{ActuatorEvent, Alert, OwnerContact, SensorReading};

pub struct SqliteGateway {
    pool: Pool<Sqlite>,
}

impl SqliteGateway {
    /// Open (or create) the database and run pending migrations
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref();
        info!("initializing SQLite gateway at: {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("database migrations complete");

        Ok(Self { pool })
    }

    /// Register a device, creating its owner when a contact is given
    ///
    /// Re-registering a device replaces its owner.
    #[instrument(skip(self, owner))]
    pub async fn register_device(
        &self,
        device_id: &str,
        owner: Option<&OwnerContact>,
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        let user_id = match owner {
            Some(contact) => {
                let result = sqlx::query("INSERT INTO users (email, phone) VALUES (?, ?)")
                    .bind(&contact.email)
                    .bind(&contact.phone)
                    .execute(&mut *tx)
                    .await?;
                Some(result.last_insert_rowid())
            }
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO devices (mac_address, user_id)
            VALUES (?, ?)
            ON CONFLICT (mac_address) DO UPDATE SET user_id = excluded.user_id
            "#,
        )
        .bind(device_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn close(&self) {
        info!("closing SQLite gateway");
        self.pool.close().await;
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn severity(row: &SqliteRow) -> StorageResult<SeverityTier> {
        let raw: String = row.try_get("severity")?;
        raw.parse().map_err(StorageError::CorruptRow)
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    #[instrument(skip(self, reading), fields(device = %reading.mac_address))]
    async fn insert_reading(
        &self,
        reading: &SensorReading,
        severity: SeverityTier,
    ) -> StorageResult<()> {
        let row = ReadingRow::from_reading(reading, severity, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO readings (device_id, sensor, value, severity, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.device_id)
        .bind(&row.sensor)
        .bind(row.value)
        .bind(row.severity.as_str())
        .bind(Self::timestamp_to_millis(&row.recorded_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, event), fields(device = %event.mac_address))]
    async fn insert_actuator_event(&self, event: &ActuatorEvent) -> StorageResult<()> {
        let row = ActuatorEventRow::from_event(event, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO actuator_events (
                device_id, label, actuator, sensor_id, humidity, runtime_secs, recorded_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.device_id)
        .bind(&row.label)
        .bind(&row.actuator)
        .bind(row.sensor_id)
        .bind(row.humidity)
        .bind(row.runtime_secs)
        .bind(Self::timestamp_to_millis(&row.recorded_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, alert), fields(device = %alert.device_id))]
    async fn insert_alert(&self, alert: &Alert) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (device_id, sensor, value, severity, message, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&alert.device_id)
        .bind(&alert.sensor)
        .bind(alert.value)
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(Self::timestamp_to_millis(&alert.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn resolve_owner(&self, device_id: &str) -> StorageResult<Option<OwnerContact>> {
        let row = sqlx::query(
            r#"
            SELECT d.user_id AS user_id, u.email AS email, u.phone AS phone
            FROM devices d
            LEFT JOIN users u ON u.id = d.user_id
            WHERE d.mac_address = ?
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            debug!("device {device_id} is not registered");
            return Ok(None);
        };

        let user_id: Option<i64> = row.try_get("user_id")?;
        if user_id.is_none() {
            debug!("device {device_id} has no owner assigned");
            return Ok(None);
        }

        let contact = OwnerContact::new(row.try_get("email")?, row.try_get("phone")?);
        if contact.is_empty() {
            warn!("owner of {device_id} has neither email nor phone");
            return Ok(None);
        }
        if contact.phone.is_none() {
            warn!("owner of {device_id} has no phone number configured");
        }

        Ok(Some(contact))
    }

    #[instrument(skip(self))]
    async fn recent_readings(
        &self,
        device_id: &str,
        limit: usize,
    ) -> StorageResult<Vec<ReadingRow>> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, sensor, value, severity, recorded_at
            FROM readings
            WHERE device_id = ?
            ORDER BY recorded_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(device_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ReadingRow {
                    device_id: row.try_get("device_id")?,
                    sensor: row.try_get("sensor")?,
                    value: row.try_get("value")?,
                    severity: Self::severity(row)?,
                    recorded_at: Self::millis_to_timestamp(row.try_get("recorded_at")?),
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn recent_alerts(&self, device_id: &str, limit: usize) -> StorageResult<Vec<AlertRow>> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, sensor, value, severity, message, created_at
            FROM alerts
            WHERE device_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(device_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AlertRow {
                    device_id: row.try_get("device_id")?,
                    sensor: row.try_get("sensor")?,
                    value: row.try_get("value")?,
                    severity: Self::severity(row)?,
                    message: row.try_get("message")?,
                    created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
                })
            })
            .collect()
    }

    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
