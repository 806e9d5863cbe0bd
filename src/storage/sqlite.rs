//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Dashboard reads do not block the ingestion endpoint
//! - **Connection pooling**: Efficient resource usage
//! - **Migrations**: Automatic schema versioning with sqlx
//!
//! Timestamps are stored as Unix milliseconds, reading ids as hyphenated
//! UUID text.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{
    AlertFilter, AlertRecord, AlertStats, AlertStatus, NewAlert, ReadingQuery, Threshold,
};
use crate::{Reading, Variable};

const READING_COLUMNS: &str =
    "id, module_id, captured_at, temperature, humidity, co, co2, ammonia";

const ALERT_COLUMNS: &str = "id, variable, priority, message, module_id, observed_value, \
     threshold_value, status, created_at, resolved_at, sensor_label";

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Create a new SQLite backend
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Run migrations to create tables
    /// 3. Configure SQLite for WAL mode with a busy timeout
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use aviary_monitoring::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./aviary.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
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

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }

    fn reading_from_row(row: &SqliteRow) -> StorageResult<Reading> {
        let id: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id).map_err(|e| {
            StorageError::SerializationError(format!("invalid reading id {id}: {e}"))
        })?;

        Ok(Reading {
            id,
            module_id: row.try_get("module_id")?,
            captured_at: Self::millis_to_timestamp(row.try_get("captured_at")?),
            temperature: row.try_get("temperature")?,
            humidity: row.try_get("humidity")?,
            co: row.try_get("co")?,
            co2: row.try_get("co2")?,
            ammonia: row.try_get("ammonia")?,
        })
    }

    fn alert_from_row(row: &SqliteRow) -> StorageResult<AlertRecord> {
        let variable: String = row.try_get("variable")?;
        let priority: String = row.try_get("priority")?;
        let status: String = row.try_get("status")?;

        Ok(AlertRecord {
            id: row.try_get("id")?,
            variable: variable.parse().map_err(|e: crate::UnknownVariable| {
                StorageError::SerializationError(e.to_string())
            })?,
            priority: priority.parse().map_err(StorageError::SerializationError)?,
            message: row.try_get("message")?,
            module_id: row.try_get("module_id")?,
            observed_value: row.try_get("observed_value")?,
            threshold_value: row.try_get("threshold_value")?,
            status: status.parse().map_err(StorageError::SerializationError)?,
            created_at: Self::millis_to_timestamp(row.try_get("created_at")?),
            resolved_at: row
                .try_get::<Option<i64>, _>("resolved_at")?
                .map(Self::millis_to_timestamp),
            sensor_label: row.try_get("sensor_label")?,
        })
    }

    async fn alert_by_id(&self, id: i64) -> StorageResult<Option<AlertRecord>> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?");
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| Self::alert_from_row(&row))
            .transpose()
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip_all, fields(reading_id = %reading.id, module_id = %reading.module_id))]
    async fn insert_reading(&self, reading: &Reading) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO readings (
                id, module_id, captured_at, temperature, humidity, co, co2, ammonia
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(reading.id.hyphenated().to_string())
        .bind(&reading.module_id)
        .bind(Self::timestamp_to_millis(&reading.captured_at))
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.co)
        .bind(reading.co2)
        .bind(reading.ammonia)
        .execute(&self.pool)
        .await
        .map_err(|e| match StorageError::from(e) {
            StorageError::Conflict(_) => {
                StorageError::Conflict(format!("reading {} already stored", reading.id))
            }
            other => other,
        })?;

        debug!("reading stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn recent_readings(&self, limit: usize) -> StorageResult<Vec<Reading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings ORDER BY captured_at DESC, rowid DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::reading_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn latest_reading(&self, module_id: &str) -> StorageResult<Option<Reading>> {
        let sql = format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE module_id = ? \
             ORDER BY captured_at DESC, rowid DESC LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(module_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| Self::reading_from_row(&row))
            .transpose()
    }

    #[instrument(skip(self), fields(module_id = ?query.module_id))]
    async fn query_readings(&self, query: ReadingQuery) -> StorageResult<Vec<Reading>> {
        let mut sql = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {READING_COLUMNS} FROM readings WHERE captured_at >= "
        ));
        sql.push_bind(Self::timestamp_to_millis(&query.start))
            .push(" AND captured_at <= ")
            .push_bind(Self::timestamp_to_millis(&query.end));

        if let Some(module_id) = query.module_id {
            sql.push(" AND module_id = ").push_bind(module_id);
        }

        let limit = query.limit.map(|limit| limit as i64).unwrap_or(-1);
        sql.push(" ORDER BY captured_at ASC, rowid ASC LIMIT ")
            .push_bind(limit);

        let rows = sql.build().fetch_all(&self.pool).await?;
        debug!("query returned {} readings", rows.len());
        rows.iter().map(Self::reading_from_row).collect()
    }

    async fn thresholds(&self) -> StorageResult<Vec<Threshold>> {
        let rows = sqlx::query("SELECT variable, medium, high, critical FROM thresholds")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> StorageResult<Threshold> {
                let variable: String = row.try_get("variable")?;
                Ok(Threshold {
                    variable: variable
                        .parse::<Variable>()
                        .map_err(|e| StorageError::SerializationError(e.to_string()))?,
                    medium: row.try_get("medium")?,
                    high: row.try_get("high")?,
                    critical: row.try_get("critical")?,
                })
            })
            .collect()
    }

    #[instrument(skip_all, fields(count = thresholds.len()))]
    async fn upsert_thresholds(&self, thresholds: Vec<Threshold>) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        for threshold in &thresholds {
            sqlx::query(
                r#"
                INSERT INTO thresholds (variable, medium, high, critical)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (variable) DO UPDATE SET
                    medium = excluded.medium,
                    high = excluded.high,
                    critical = excluded.critical
                "#,
            )
            .bind(threshold.variable.name())
            .bind(threshold.medium)
            .bind(threshold.high)
            .bind(threshold.critical)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("stored {} thresholds", thresholds.len());
        Ok(())
    }

    async fn latest_alert(
        &self,
        variable: Variable,
        module_id: &str,
    ) -> StorageResult<Option<AlertRecord>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE variable = ? AND module_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT 1"
        );
        sqlx::query(&sql)
            .bind(variable.name())
            .bind(module_id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| Self::alert_from_row(&row))
            .transpose()
    }

    #[instrument(skip_all, fields(count = alerts.len()))]
    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> StorageResult<Vec<AlertRecord>> {
        if alerts.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(alerts.len());

        for alert in alerts {
            let result = sqlx::query(
                r#"
                INSERT INTO alerts (
                    variable, priority, message, module_id, observed_value,
                    threshold_value, status, created_at, sensor_label
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(alert.variable.name())
            .bind(alert.priority.as_str())
            .bind(&alert.message)
            .bind(&alert.module_id)
            .bind(alert.observed_value)
            .bind(alert.threshold_value)
            .bind(AlertStatus::Active.as_str())
            .bind(Self::timestamp_to_millis(&alert.created_at))
            .bind(&alert.sensor_label)
            .execute(&mut *tx)
            .await?;

            stored.push(AlertRecord::from_new(result.last_insert_rowid(), alert));
        }

        tx.commit().await?;
        debug!("stored {} alerts", stored.len());
        Ok(stored)
    }

    #[instrument(skip(self))]
    async fn query_alerts(&self, filter: AlertFilter) -> StorageResult<Vec<AlertRecord>> {
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE 1 = 1"
        ));

        if let Some(priority) = filter.priority {
            query.push(" AND priority = ").push_bind(priority.as_str());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(module_id) = filter.module_id {
            query.push(" AND module_id = ").push_bind(module_id);
        }

        // LIMIT -1 is unbounded in SQLite
        let limit = filter.limit.map(|limit| limit as i64).unwrap_or(-1);
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(limit);

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::alert_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn update_alert_status(
        &self,
        id: i64,
        status: AlertStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<AlertRecord> {
        let resolved_at = (status == AlertStatus::Resolved).then(|| Self::timestamp_to_millis(&at));

        let result = sqlx::query(
            "UPDATE alerts SET status = ?, resolved_at = COALESCE(?, resolved_at) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(resolved_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!("alert {id}")));
        }

        self.alert_by_id(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("alert {id}")))
    }

    #[instrument(skip(self))]
    async fn acknowledge_active_alerts(&self) -> StorageResult<usize> {
        let result = sqlx::query("UPDATE alerts SET status = ? WHERE status = ?")
            .bind(AlertStatus::Acknowledged.as_str())
            .bind(AlertStatus::Active.as_str())
            .execute(&self.pool)
            .await?;

        let updated = result.rows_affected() as usize;
        info!("acknowledged {} active alerts", updated);
        Ok(updated)
    }

    async fn alert_stats(&self) -> StorageResult<AlertStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'active' AND priority = 'critical' THEN 1 ELSE 0 END), 0) AS active_critical,
                COALESCE(SUM(CASE WHEN status = 'active' AND priority = 'warning' THEN 1 ELSE 0 END), 0) AS active_warning,
                COALESCE(SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END), 0) AS resolved
            FROM alerts
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AlertStats {
            active_critical: row.try_get::<i64, _>("active_critical")? as u64,
            active_warning: row.try_get::<i64, _>("active_warning")? as u64,
            resolved: row.try_get::<i64, _>("resolved")? as u64,
        })
    }

    #[instrument(skip(self))]
    async fn delete_alerts(&self) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM alerts").execute(&self.pool).await?;

        let deleted = result.rows_affected() as usize;
        info!("deleted {} alerts", deleted);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("db_path".to_string(), self.db_path.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
