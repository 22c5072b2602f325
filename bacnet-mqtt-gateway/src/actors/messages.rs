//! Message shapes passed between actors.
//!
//! `ActorPayload` replaces the Python implementation's untyped
//! `AllowedPayloadTypes` union with a single tagged enum matched
//! exhaustively at the dispatch site (Non-goal: no permissive catch-all
//! arm). This is the one deliberate structural departure from the
//! original named in the spec's redesign notes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorName {
    Mqtt,
    Bacnet,
    BacnetWriter,
    Uploader,
    Broadcast,
    Cleaner,
    Heartbeat,
    SystemMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorMessageType {
    ConfigUploadRequest,
    ConfigUploadResponse,
    PointPublish,
    PointPublishResponse,
    DeviceReboot,
    SetValueToPointRequest,
    SetValueToPointResponse,
    ImmediateUploadTrigger,
    StartMonitoringRequest,
    StopMonitoringRequest,
    MonitoringControlResponse,
    ForceHeartbeatRequest,
    HeartbeatStatus,
    SystemMetricsSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacnetReaderConfigPayload {
    pub id: String,
    pub ip_address: String,
    pub subnet_mask: u8,
    pub bacnet_device_id: u32,
    pub port: u16,
    pub bbmd_enabled: bool,
    pub bbmd_server_ip: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUploadPayload {
    pub url_to_upload_config: Option<String>,
    pub jwt_token: Option<String>,
    pub iot_device_controllers: Vec<serde_json::Value>,
    pub bacnet_readers: Vec<BacnetReaderConfigPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigUploadResponsePayload {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointPublishPayload {
    pub controller_id: String,
    pub point_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRebootPayload {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointValuePayload {
    pub iot_device_point_id: Uuid,
    pub present_value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetValueToPointRequestPayload {
    pub iot_device_point_id: Uuid,
    pub point_instance_id: u32,
    pub controller_id: String,
    pub present_value: serde_json::Value,
    pub state_text: Option<String>,
    pub command_id: String,
    pub command_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetValueToPointResponsePayload {
    pub success: bool,
    pub message: String,
    pub command_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImmediateUploadTriggerPayload {
    pub controller_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringControlPayload {
    pub reader_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringControlResponsePayload {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForceHeartbeatPayload {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatStatusPayload {
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub disk: Option<f64>,
    pub temperature: Option<f64>,
    pub uptime: Option<i64>,
    pub load: Option<f64>,
    pub monitoring_status: String,
    pub mqtt_connection_status: String,
    pub bacnet_connection_status: String,
    pub bacnet_devices_connected: i64,
    pub bacnet_points_monitored: i64,
}

/// Replaces the Python `AllowedPayloadTypes` union. Every variant names the
/// message type it carries so dispatch can match exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ActorPayload {
    ConfigUploadRequest(ConfigUploadPayload),
    ConfigUploadResponse(ConfigUploadResponsePayload),
    PointPublish(PointPublishPayload),
    PointPublishResponse(PointPublishPayload),
    DeviceReboot(DeviceRebootPayload),
    SetValueToPointRequest(SetValueToPointRequestPayload),
    SetValueToPointResponse(SetValueToPointResponsePayload),
    ImmediateUploadTrigger(ImmediateUploadTriggerPayload),
    MonitoringControl(MonitoringControlPayload),
    MonitoringControlResponse(MonitoringControlResponsePayload),
    ForceHeartbeat(ForceHeartbeatPayload),
    HeartbeatStatus(HeartbeatStatusPayload),
}

#[derive(Debug, Clone)]
pub struct ActorMessage {
    pub sender: ActorName,
    pub receiver: ActorName,
    pub message_type: ActorMessageType,
    pub payload: ActorPayload,
}
