//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that all
//! storage implementations must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{
    AlertFilter, AlertRecord, AlertStats, AlertStatus, NewAlert, ReadingQuery, Threshold,
};
use crate::{Reading, Variable};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: std::collections::HashMap<String, String>,
}

/// Trait for persistent storage backends
///
/// Implementations must be `Send + Sync`: the API handlers and the
/// evaluator actor share one backend behind an `Arc`.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>` which wraps `StorageError`.
/// Implementations should convert backend-specific errors to
/// `StorageError` variants.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    // ========================================================================
    // Readings
    // ========================================================================

    /// Persist one reading
    ///
    /// Fails with `StorageError::Conflict` if a reading with the same id
    /// already exists.
    async fn insert_reading(&self, reading: &Reading) -> StorageResult<()>;

    /// The `limit` most recent readings across all modules, newest first
    async fn recent_readings(&self, limit: usize) -> StorageResult<Vec<Reading>>;

    /// The most recent reading for one module
    async fn latest_reading(&self, module_id: &str) -> StorageResult<Option<Reading>>;

    /// Readings captured within a time range, oldest first
    ///
    /// Implementations should use the `(module_id, captured_at)` index
    /// for efficient range scans.
    async fn query_readings(&self, query: ReadingQuery) -> StorageResult<Vec<Reading>>;

    // ========================================================================
    // Thresholds
    // ========================================================================

    async fn thresholds(&self) -> StorageResult<Vec<Threshold>>;

    /// Insert or replace thresholds, keyed by variable
    async fn upsert_thresholds(&self, thresholds: Vec<Threshold>) -> StorageResult<()>;

    // ========================================================================
    // Alerts
    // ========================================================================

    /// Most recent alert for a (variable, module) pair, whatever its status
    async fn latest_alert(
        &self,
        variable: Variable,
        module_id: &str,
    ) -> StorageResult<Option<AlertRecord>>;

    /// Persist a batch of alerts atomically, returning them with their ids
    async fn insert_alerts(&self, alerts: Vec<NewAlert>) -> StorageResult<Vec<AlertRecord>>;

    /// Alerts matching the filter, newest first
    async fn query_alerts(&self, filter: AlertFilter) -> StorageResult<Vec<AlertRecord>>;

    /// Change the status of one alert
    ///
    /// `resolved_at` is set to `at` when the new status is `Resolved`.
    /// Fails with `StorageError::NotFound` for an unknown id.
    async fn update_alert_status(
        &self,
        id: i64,
        status: AlertStatus,
        at: DateTime<Utc>,
    ) -> StorageResult<AlertRecord>;

    /// Mark every active alert as acknowledged, returning how many changed
    async fn acknowledge_active_alerts(&self) -> StorageResult<usize>;

    async fn alert_stats(&self) -> StorageResult<AlertStats>;

    /// Remove every alert, returning how many were deleted
    async fn delete_alerts(&self) -> StorageResult<usize>;

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database, check file access).
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
