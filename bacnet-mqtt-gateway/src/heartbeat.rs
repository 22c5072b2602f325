//! The heartbeat actor: publishes device/system health on a timer, or
//! immediately on a `ForceHeartbeatRequest`.
//!
//! Grounded in spec §4.7 plus the enrichment pattern of
//! `publish_heartbeat_status` in `mqtt_controller.py` (timestamp and
//! identity fields are added at publish time, not at snapshot time).
//! No kept Python source file implements the heartbeat collector itself
//! (only its test names survive in the retrieval pack), so the read path
//! here is grounded directly in the spec's described fields.

use crate::config::DeviceIdentity;
use crate::mqtt::dispatcher::CommandDispatcher;
use crate::store::models::{ConnectionStatus, DeviceStatusSnapshot, MonitoringStatus};
use crate::store::PointStore;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

pub struct Heartbeat {
    store: Arc<PointStore>,
    dispatcher: Arc<CommandDispatcher>,
    identity: DeviceIdentity,
}

impl Heartbeat {
    pub fn new(store: Arc<PointStore>, dispatcher: Arc<CommandDispatcher>, identity: DeviceIdentity) -> Self {
        Self { store, dispatcher, identity }
    }

    /// Publishes the most recent status snapshot. If no snapshot has been
    /// recorded yet (first tick before any monitor cycle has run), the
    /// numeric fields publish as null rather than the beat being skipped —
    /// a missing heartbeat could otherwise be misread as the agent being
    /// fully down instead of still starting up.
    pub async fn publish(&self) {
        let now = chrono::Utc::now();
        let status = match self.store.latest_device_status().await {
            Ok(Some(snapshot)) => snapshot_to_json(&snapshot),
            Ok(None) => empty_status_json(),
            Err(e) => {
                error!(error = %e, "failed to read device status for heartbeat, publishing error status");
                error_status_json()
            }
        };

        if let Err(e) = self.dispatcher.publish_heartbeat(&self.identity, status, now).await {
            error!(error = %e, "failed to publish heartbeat");
        } else {
            info!("heartbeat published");
        }
    }
}

fn snapshot_to_json(s: &DeviceStatusSnapshot) -> serde_json::Value {
    json!({
        "cpu": s.cpu,
        "memory": s.memory,
        "disk": s.disk,
        "temperature": s.temperature,
        "uptime": s.uptime,
        "load": s.load,
        "monitoring_status": s.monitoring_status.as_str(),
        "mqtt_connection_status": s.mqtt_connection_status.as_str(),
        "bacnet_connection_status": s.bacnet_connection_status.as_str(),
        "bacnet_devices_connected": s.bacnet_devices_connected,
        "bacnet_points_monitored": s.bacnet_points_monitored,
    })
}

fn empty_status_json() -> serde_json::Value {
    json!({
        "cpu": null,
        "memory": null,
        "disk": null,
        "temperature": null,
        "uptime": null,
        "load": null,
        "monitoring_status": MonitoringStatus::Initializing.as_str(),
        "mqtt_connection_status": ConnectionStatus::Disconnected.as_str(),
        "bacnet_connection_status": ConnectionStatus::Disconnected.as_str(),
        "bacnet_devices_connected": 0,
        "bacnet_points_monitored": 0,
    })
}

fn error_status_json() -> serde_json::Value {
    json!({
        "cpu": null,
        "memory": null,
        "disk": null,
        "temperature": null,
        "uptime": null,
        "load": null,
        "monitoring_status": MonitoringStatus::Error.as_str(),
        "mqtt_connection_status": ConnectionStatus::Disconnected.as_str(),
        "bacnet_connection_status": ConnectionStatus::Disconnected.as_str(),
        "bacnet_devices_connected": 0,
        "bacnet_points_monitored": 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::topics::{build_mqtt_topic_dict, default_schema, TopicIdentity};
    use crate::mqtt::RecordingPublisher;

    async fn test_heartbeat() -> (tempfile::TempDir, Heartbeat, Arc<RecordingPublisher>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PointStore::connect(dir.path().join("db.sqlite").to_str().unwrap()).await.unwrap());
        let publisher = Arc::new(RecordingPublisher::new());
        let schema = default_schema();
        let topics = build_mqtt_topic_dict(
            &schema,
            &TopicIdentity {
                organization_id: "org1",
                site_id: "site1",
                iot_device_id: "dev1",
                controller_device_id: None,
                iot_device_point_id: None,
            },
        )
        .unwrap();
        let dispatcher = Arc::new(CommandDispatcher::new(publisher.clone(), topics));
        let identity = DeviceIdentity {
            organization_id: "org1".to_string(),
            site_id: "site1".to_string(),
            iot_device_id: "dev1".to_string(),
            controller_device_id: None,
            iot_device_point_id: None,
        };
        (dir, Heartbeat::new(store, dispatcher, identity), publisher)
    }

    #[tokio::test]
    async fn publishes_null_fields_before_any_snapshot_recorded() {
        let (_dir, heartbeat, publisher) = test_heartbeat().await;
        heartbeat.publish().await;

        let calls = publisher.published.lock().await;
        assert_eq!(calls.len(), 1);
        let payload: serde_json::Value = serde_json::from_slice(&calls[0].3).unwrap();
        assert!(payload["cpu"].is_null());
        assert_eq!(payload["monitoring_status"], json!("initializing"));
    }

    #[tokio::test]
    async fn publishes_recorded_snapshot_fields() {
        let (_dir, heartbeat, publisher) = test_heartbeat().await;
        // reach through the store to seed a snapshot the way a monitor
        // cycle's status update would.
        let snapshot = DeviceStatusSnapshot {
            cpu: Some(5.0),
            memory: Some(10.0),
            disk: Some(20.0),
            temperature: None,
            uptime: Some(120),
            load: Some(0.1),
            monitoring_status: MonitoringStatus::Active,
            mqtt_connection_status: ConnectionStatus::Connected,
            bacnet_connection_status: ConnectionStatus::Connected,
            bacnet_devices_connected: 2,
            bacnet_points_monitored: 10,
        };
        heartbeat.store.record_device_status(&snapshot).await.unwrap();

        heartbeat.publish().await;

        let calls = publisher.published.lock().await;
        let payload: serde_json::Value = serde_json::from_slice(&calls[0].3).unwrap();
        assert_eq!(payload["bacnet_devices_connected"], json!(2));
        assert_eq!(payload["organization_id"], json!("org1"));
    }
}
