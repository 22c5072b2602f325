//! SQLite-backed persistence for controller points and device status.
//!
//! Grounded in `sqlmodel_client.py`'s WAL setup (journal_mode=WAL,
//! busy_timeout=30000) and the point lifecycle described in spec §4.4/§5:
//! `is_uploaded` starts false, flips to true exactly once on successful
//! publish, and never reverses; deletion by the cleanup tick is the only
//! retirement path.

pub mod models;
pub mod retry;

use crate::error::StoreError;
use crate::store::models::ControllerPoint;
use crate::store::retry::with_db_retry;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

pub struct PointStore {
    pool: SqlitePool,
}

impl PointStore {
    pub async fn connect(database_path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{database_path}"))
            .map_err(|e| StoreError::Fatal(e.to_string()))?
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(30))
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Fatal(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cpu REAL,
                memory REAL,
                disk REAL,
                temperature REAL,
                uptime INTEGER,
                load REAL,
                monitoring_status TEXT NOT NULL,
                mqtt_connection_status TEXT NOT NULL,
                bacnet_connection_status TEXT NOT NULL,
                bacnet_devices_connected INTEGER NOT NULL,
                bacnet_points_monitored INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::classify(&e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS controller_points (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                iot_device_point_id TEXT NOT NULL,
                controller_id TEXT NOT NULL,
                object_type TEXT NOT NULL,
                object_id INTEGER NOT NULL,
                present_value TEXT,
                status_flags TEXT,
                event_state TEXT,
                out_of_service INTEGER,
                reliability TEXT,
                min_pres_value REAL,
                max_pres_value REAL,
                high_limit REAL,
                low_limit REAL,
                resolution REAL,
                priority_array TEXT,
                relinquish_default TEXT,
                cov_increment REAL,
                time_delay INTEGER,
                time_delay_normal INTEGER,
                notification_class INTEGER,
                notify_type TEXT,
                deadband REAL,
                limit_enable TEXT,
                event_enable TEXT,
                acked_transitions TEXT,
                event_time_stamps TEXT,
                event_message_texts TEXT,
                event_message_texts_config TEXT,
                event_detection_enable INTEGER,
                event_algorithm_inhibit_ref TEXT,
                event_algorithm_inhibit INTEGER,
                reliability_evaluation_inhibit INTEGER,
                error_info TEXT,
                is_uploaded INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::classify(&e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_controller_points_pending \
             ON controller_points (is_uploaded) WHERE is_uploaded = 0",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::classify(&e))?;

        Ok(())
    }

    /// Records a heartbeat snapshot (spec §4.7). Each heartbeat tick
    /// appends a row rather than upserting, so historical status is
    /// retained for diagnostics.
    pub async fn record_device_status(
        &self,
        status: &crate::store::models::DeviceStatusSnapshot,
    ) -> Result<(), StoreError> {
        with_db_retry("record_device_status", || async {
            sqlx::query(
                r#"
                INSERT INTO device_status
                    (cpu, memory, disk, temperature, uptime, load,
                     monitoring_status, mqtt_connection_status, bacnet_connection_status,
                     bacnet_devices_connected, bacnet_points_monitored, recorded_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(status.cpu)
            .bind(status.memory)
            .bind(status.disk)
            .bind(status.temperature)
            .bind(status.uptime)
            .bind(status.load)
            .bind(status.monitoring_status.as_str())
            .bind(status.mqtt_connection_status.as_str())
            .bind(status.bacnet_connection_status.as_str())
            .bind(status.bacnet_devices_connected)
            .bind(status.bacnet_points_monitored)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// The most recently recorded status row, or `None` if a heartbeat
    /// tick fires before any status has ever been recorded (spec §4.7
    /// "null when there is no row yet").
    pub async fn latest_device_status(
        &self,
    ) -> Result<Option<crate::store::models::DeviceStatusSnapshot>, StoreError> {
        use crate::store::models::{ConnectionStatus, DeviceStatusSnapshot, MonitoringStatus};

        with_db_retry("latest_device_status", || async {
            let row = sqlx::query(
                "SELECT * FROM device_status ORDER BY id DESC LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|r| DeviceStatusSnapshot {
                cpu: r.get("cpu"),
                memory: r.get("memory"),
                disk: r.get("disk"),
                temperature: r.get("temperature"),
                uptime: r.get("uptime"),
                load: r.get("load"),
                monitoring_status: parse_monitoring_status(r.get("monitoring_status")),
                mqtt_connection_status: parse_connection_status(r.get("mqtt_connection_status")),
                bacnet_connection_status: parse_connection_status(r.get("bacnet_connection_status")),
                bacnet_devices_connected: r.get("bacnet_devices_connected"),
                bacnet_points_monitored: r.get("bacnet_points_monitored"),
            }))
        })
        .await
    }

    /// Inserts a single point row. Used as the per-row fallback when a
    /// bulk insert fails (monitor.py falls back row by row).
    pub async fn insert(&self, point: &NewControllerPoint) -> Result<i64, StoreError> {
        with_db_retry("insert_controller_point", || {
            let point = point.clone();
            async move {
                let row = sqlx::query(
                    r#"
                    INSERT INTO controller_points
                        (iot_device_point_id, controller_id, object_type, object_id,
                         present_value, status_flags, event_state, out_of_service,
                         reliability, error_info, is_uploaded, created_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
                    RETURNING id
                    "#,
                )
                .bind(point.iot_device_point_id.to_string())
                .bind(&point.controller_id)
                .bind(&point.object_type)
                .bind(point.object_id as i64)
                .bind(point.present_value.as_ref().map(|v| v.to_string()))
                .bind(&point.status_flags)
                .bind(&point.event_state)
                .bind(point.out_of_service)
                .bind(&point.reliability)
                .bind(&point.error_info)
                .bind(point.created_at.to_rfc3339())
                .fetch_one(&self.pool)
                .await?;
                Ok(row.get::<i64, _>("id"))
            }
        })
        .await
    }

    /// Bulk-inserts a batch of points. On any row's constraint failure the
    /// caller should fall back to per-row `insert` (spec §4.2 bulk-insert
    /// with per-row fallback behavior).
    pub async fn bulk_insert(&self, points: &[NewControllerPoint]) -> Result<Vec<i64>, StoreError> {
        let mut ids = Vec::with_capacity(points.len());
        for point in points {
            ids.push(self.insert(point).await?);
        }
        Ok(ids)
    }

    pub async fn get_by_controller(&self, controller_id: &str) -> Result<Vec<ControllerPoint>, StoreError> {
        with_db_retry("get_by_controller", || async {
            let rows = sqlx::query_as::<_, ControllerPointRow>(
                "SELECT * FROM controller_points WHERE controller_id = ? ORDER BY id",
            )
            .bind(controller_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    /// Points not yet uploaded, oldest first, bounded by row count
    /// (spec §4.5 upload batching).
    pub async fn get_pending(&self, limit: i64) -> Result<Vec<ControllerPoint>, StoreError> {
        with_db_retry("get_pending", || async {
            let rows = sqlx::query_as::<_, ControllerPointRow>(
                "SELECT * FROM controller_points WHERE is_uploaded = 0 ORDER BY id LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
        .await
    }

    /// Flips `is_uploaded` true for the given ids. Monotonic: never called
    /// to set it back to false (spec §4.4 state machine).
    pub async fn mark_uploaded(&self, ids: &[i64]) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        with_db_retry("mark_uploaded", || {
            let ids = ids.to_vec();
            async move {
                let placeholders = vec!["?"; ids.len()].join(",");
                let sql = format!("UPDATE controller_points SET is_uploaded = 1 WHERE id IN ({placeholders})");
                let mut query = sqlx::query(&sql);
                for id in &ids {
                    query = query.bind(id);
                }
                query.execute(&self.pool).await?;
                Ok(())
            }
        })
        .await
    }

    /// Deletes uploaded rows older than the cleanup tick's retention
    /// window. Deletion is the sole retirement path for a point row.
    pub async fn delete_uploaded(&self) -> Result<u64, StoreError> {
        with_db_retry("delete_uploaded", || async {
            let result = sqlx::query("DELETE FROM controller_points WHERE is_uploaded = 1")
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }
}

#[derive(Debug, Clone)]
pub struct NewControllerPoint {
    pub iot_device_point_id: Uuid,
    pub controller_id: String,
    pub object_type: String,
    pub object_id: u32,
    pub present_value: Option<serde_json::Value>,
    pub status_flags: Option<String>,
    pub event_state: Option<String>,
    pub out_of_service: Option<bool>,
    pub reliability: Option<String>,
    pub error_info: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ControllerPointRow {
    id: i64,
    iot_device_point_id: String,
    controller_id: String,
    object_type: String,
    object_id: i64,
    present_value: Option<String>,
    status_flags: Option<String>,
    event_state: Option<String>,
    out_of_service: Option<i64>,
    reliability: Option<String>,
    min_pres_value: Option<f64>,
    max_pres_value: Option<f64>,
    high_limit: Option<f64>,
    low_limit: Option<f64>,
    resolution: Option<f64>,
    priority_array: Option<String>,
    relinquish_default: Option<String>,
    cov_increment: Option<f64>,
    time_delay: Option<i64>,
    time_delay_normal: Option<i64>,
    notification_class: Option<i64>,
    notify_type: Option<String>,
    deadband: Option<f64>,
    limit_enable: Option<String>,
    event_enable: Option<String>,
    acked_transitions: Option<String>,
    event_time_stamps: Option<String>,
    event_message_texts: Option<String>,
    event_message_texts_config: Option<String>,
    event_detection_enable: Option<i64>,
    event_algorithm_inhibit_ref: Option<String>,
    event_algorithm_inhibit: Option<i64>,
    reliability_evaluation_inhibit: Option<i64>,
    error_info: Option<String>,
    is_uploaded: i64,
    created_at: String,
}

fn parse_json(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn parse_monitoring_status(s: String) -> crate::store::models::MonitoringStatus {
    use crate::store::models::MonitoringStatus;
    match s.as_str() {
        "active" => MonitoringStatus::Active,
        "stopped" => MonitoringStatus::Stopped,
        "error" => MonitoringStatus::Error,
        _ => MonitoringStatus::Initializing,
    }
}

fn parse_connection_status(s: String) -> crate::store::models::ConnectionStatus {
    use crate::store::models::ConnectionStatus;
    match s.as_str() {
        "connected" => ConnectionStatus::Connected,
        "error" => ConnectionStatus::Error,
        _ => ConnectionStatus::Disconnected,
    }
}

impl From<ControllerPointRow> for ControllerPoint {
    fn from(row: ControllerPointRow) -> Self {
        ControllerPoint {
            id: row.id,
            iot_device_point_id: Uuid::parse_str(&row.iot_device_point_id).unwrap_or_default(),
            controller_id: row.controller_id,
            object_type: row.object_type,
            object_id: row.object_id as u32,
            present_value: parse_json(row.present_value),
            status_flags: row.status_flags,
            event_state: row.event_state,
            out_of_service: row.out_of_service.map(|v| v != 0),
            reliability: row.reliability,
            min_pres_value: row.min_pres_value,
            max_pres_value: row.max_pres_value,
            high_limit: row.high_limit,
            low_limit: row.low_limit,
            resolution: row.resolution,
            priority_array: parse_json(row.priority_array),
            relinquish_default: parse_json(row.relinquish_default),
            cov_increment: row.cov_increment,
            time_delay: row.time_delay,
            time_delay_normal: row.time_delay_normal,
            notification_class: row.notification_class,
            notify_type: row.notify_type,
            deadband: row.deadband,
            limit_enable: parse_json(row.limit_enable),
            event_enable: parse_json(row.event_enable),
            acked_transitions: parse_json(row.acked_transitions),
            event_time_stamps: parse_json(row.event_time_stamps),
            event_message_texts: parse_json(row.event_message_texts),
            event_message_texts_config: parse_json(row.event_message_texts_config),
            event_detection_enable: row.event_detection_enable.map(|v| v != 0),
            event_algorithm_inhibit_ref: parse_json(row.event_algorithm_inhibit_ref),
            event_algorithm_inhibit: row.event_algorithm_inhibit.map(|v| v != 0),
            reliability_evaluation_inhibit: row.reliability_evaluation_inhibit.map(|v| v != 0),
            error_info: row.error_info,
            is_uploaded: row.is_uploaded != 0,
            created_at: chrono::DateTime::parse_from_rfc3339(&row.created_at)
                .map(|d| d.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (tempfile::TempDir, PointStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = PointStore::connect(path.to_str().unwrap()).await.unwrap();
        (dir, store)
    }

    fn sample_point(controller_id: &str) -> NewControllerPoint {
        NewControllerPoint {
            iot_device_point_id: crate::ids::iot_device_point_id(controller_id, 1),
            controller_id: controller_id.to_string(),
            object_type: "analogInput".to_string(),
            object_id: 1,
            present_value: Some(serde_json::json!(72.5)),
            status_flags: Some("in-alarm;fault".to_string()),
            event_state: Some("normal".to_string()),
            out_of_service: Some(false),
            reliability: None,
            error_info: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_get_by_controller_roundtrips() {
        let (_dir, store) = test_store().await;
        store.insert(&sample_point("c1")).await.unwrap();
        let points = store.get_by_controller("c1").await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].present_value, Some(serde_json::json!(72.5)));
        assert!(!points[0].is_uploaded);
    }

    #[tokio::test]
    async fn mark_uploaded_is_monotonic_and_scoped() {
        let (_dir, store) = test_store().await;
        let id1 = store.insert(&sample_point("c1")).await.unwrap();
        store.insert(&sample_point("c1")).await.unwrap();

        store.mark_uploaded(&[id1]).await.unwrap();
        let pending = store.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn delete_uploaded_only_removes_uploaded_rows() {
        let (_dir, store) = test_store().await;
        let id1 = store.insert(&sample_point("c1")).await.unwrap();
        store.insert(&sample_point("c1")).await.unwrap();
        store.mark_uploaded(&[id1]).await.unwrap();

        let deleted = store.delete_uploaded().await.unwrap();
        assert_eq!(deleted, 1);
        let remaining = store.get_by_controller("c1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(!remaining[0].is_uploaded);
    }

    #[tokio::test]
    async fn latest_device_status_is_none_before_any_heartbeat() {
        let (_dir, store) = test_store().await;
        assert!(store.latest_device_status().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_and_reads_back_latest_device_status() {
        use crate::store::models::{ConnectionStatus, DeviceStatusSnapshot, MonitoringStatus};
        let (_dir, store) = test_store().await;
        let snapshot = DeviceStatusSnapshot {
            cpu: Some(12.5),
            memory: Some(40.0),
            disk: Some(55.0),
            temperature: None,
            uptime: Some(3600),
            load: Some(0.5),
            monitoring_status: MonitoringStatus::Active,
            mqtt_connection_status: ConnectionStatus::Connected,
            bacnet_connection_status: ConnectionStatus::Connected,
            bacnet_devices_connected: 3,
            bacnet_points_monitored: 42,
        };
        store.record_device_status(&snapshot).await.unwrap();
        let got = store.latest_device_status().await.unwrap().unwrap();
        assert_eq!(got.bacnet_devices_connected, 3);
        assert_eq!(got.monitoring_status, MonitoringStatus::Active);
    }

    #[tokio::test]
    async fn get_pending_is_bounded_by_limit() {
        let (_dir, store) = test_store().await;
        for _ in 0..5 {
            store.insert(&sample_point("c1")).await.unwrap();
        }
        let pending = store.get_pending(3).await.unwrap();
        assert_eq!(pending.len(), 3);
    }
}
