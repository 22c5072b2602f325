//! Row shapes persisted by the point store.
//!
//! `ControllerPoint` carries every optional health/config property the
//! monitor can read, mirroring `ControllerPointsModel` in the original
//! Python app (`monitor.py::_create_controller_point_model`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerPoint {
    pub id: i64,
    pub iot_device_point_id: Uuid,
    pub controller_id: String,
    pub object_type: String,
    pub object_id: u32,
    pub present_value: Option<serde_json::Value>,
    pub status_flags: Option<String>,
    pub event_state: Option<String>,
    pub out_of_service: Option<bool>,
    pub reliability: Option<String>,
    pub min_pres_value: Option<f64>,
    pub max_pres_value: Option<f64>,
    pub high_limit: Option<f64>,
    pub low_limit: Option<f64>,
    pub resolution: Option<f64>,
    pub priority_array: Option<serde_json::Value>,
    pub relinquish_default: Option<serde_json::Value>,
    pub cov_increment: Option<f64>,
    pub time_delay: Option<i64>,
    pub time_delay_normal: Option<i64>,
    pub notification_class: Option<i64>,
    pub notify_type: Option<String>,
    pub deadband: Option<f64>,
    pub limit_enable: Option<serde_json::Value>,
    pub event_enable: Option<serde_json::Value>,
    pub acked_transitions: Option<serde_json::Value>,
    pub event_time_stamps: Option<serde_json::Value>,
    pub event_message_texts: Option<serde_json::Value>,
    pub event_message_texts_config: Option<serde_json::Value>,
    pub event_detection_enable: Option<bool>,
    pub event_algorithm_inhibit_ref: Option<serde_json::Value>,
    pub event_algorithm_inhibit: Option<bool>,
    pub reliability_evaluation_inhibit: Option<bool>,
    pub error_info: Option<String>,
    pub is_uploaded: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitoringStatus {
    Initializing,
    Active,
    Stopped,
    Error,
}

impl MonitoringStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitoringStatus::Initializing => "initializing",
            MonitoringStatus::Active => "active",
            MonitoringStatus::Stopped => "stopped",
            MonitoringStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Error => "error",
        }
    }
}

/// Snapshot fed to heartbeat publication (spec §4.7 `HeartbeatStatusPayload`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatusSnapshot {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub disk: Option<f64>,
    pub temperature: Option<f64>,
    pub uptime: Option<i64>,
    pub load: Option<f64>,
    pub monitoring_status: MonitoringStatus,
    pub mqtt_connection_status: ConnectionStatus,
    pub bacnet_connection_status: ConnectionStatus,
    pub bacnet_devices_connected: i64,
    pub bacnet_points_monitored: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerDescriptor {
    pub controller_id: String,
    pub ip_address: String,
    pub device_instance: u32,
    pub reader_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointDescriptor {
    pub point_id: u32,
    pub object_type: String,
    pub object_properties: Option<serde_json::Value>,
}
