//! Command dispatch and point serialization for outbound MQTT traffic.
//!
//! Grounded in `mqtt_command_dispatcher.py` (`_serialize_point`,
//! `publish_response`/`publish_heartbeat`/`publish_point_bulk`) and
//! `mqtt_controller.py`'s `MQTTHandler` (routes inbound command requests to
//! the owning actor, enriches heartbeat payloads with identity fields at
//! publish time).

use crate::bacnet::health::status_flags_to_list;
use crate::config::DeviceIdentity;
use crate::mqtt::topics::Topics;
use crate::mqtt::MqttPublisher;
use crate::store::models::ControllerPoint;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Serializes a stored point the same way `_serialize_point` does: ISO-8601
/// timestamp, status_flags split into a list, named JSON-string properties
/// re-parsed into structured JSON, plus a unix-millis timestamp field.
pub fn serialize_point(point: &ControllerPoint) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), json!(point.id));
    out.insert(
        "iotDevicePointId".to_string(),
        json!(point.iot_device_point_id.to_string()),
    );
    out.insert("controllerId".to_string(), json!(point.controller_id));
    out.insert("objectType".to_string(), json!(point.object_type));
    out.insert("objectId".to_string(), json!(point.object_id));
    out.insert(
        "presentValue".to_string(),
        point.present_value.clone().unwrap_or(Value::Null),
    );

    out.insert(
        "statusFlags".to_string(),
        match &point.status_flags {
            Some(raw) => json!(status_flags_to_list(raw)),
            None => Value::Null,
        },
    );

    out.insert("eventState".to_string(), json!(point.event_state));
    out.insert("outOfService".to_string(), json!(point.out_of_service));
    out.insert("reliability".to_string(), json!(point.reliability));
    out.insert("errorInfo".to_string(), json!(point.error_info));

    // already-structured JSON fields pass through directly; these were
    // stored as JSON text in sqlite and decoded back to Value on read.
    out.insert("priorityArray".to_string(), point.priority_array.clone().unwrap_or(Value::Null));
    out.insert("limitEnable".to_string(), point.limit_enable.clone().unwrap_or(Value::Null));
    out.insert("eventEnable".to_string(), point.event_enable.clone().unwrap_or(Value::Null));
    out.insert("ackedTransitions".to_string(), point.acked_transitions.clone().unwrap_or(Value::Null));
    out.insert("eventTimeStamps".to_string(), point.event_time_stamps.clone().unwrap_or(Value::Null));
    out.insert("eventMessageTexts".to_string(), point.event_message_texts.clone().unwrap_or(Value::Null));
    out.insert(
        "eventMessageTextsConfig".to_string(),
        point.event_message_texts_config.clone().unwrap_or(Value::Null),
    );
    out.insert(
        "eventAlgorithmInhibitRef".to_string(),
        point.event_algorithm_inhibit_ref.clone().unwrap_or(Value::Null),
    );

    out.insert(
        "createdAt".to_string(),
        json!(point.created_at.to_rfc3339()),
    );
    out.insert(
        "createdAtUnixMilliTimestamp".to_string(),
        json!(point.created_at.timestamp_millis()),
    );

    Value::Object(out)
}

/// Bulk point payload shape published on `data.point_bulk`
/// (`publish_point_bulk` builds `{"points": [...]}`).
pub fn serialize_point_bulk(points: &[ControllerPoint]) -> Value {
    json!({ "points": points.iter().map(serialize_point).collect::<Vec<_>>() })
}

pub struct CommandDispatcher {
    publisher: Arc<dyn MqttPublisher>,
    topics: Topics,
}

impl CommandDispatcher {
    pub fn new(publisher: Arc<dyn MqttPublisher>, topics: Topics) -> Self {
        Self { publisher, topics }
    }

    pub async fn publish_point_bulk(&self, points: &[ControllerPoint]) -> Result<(), crate::error::TransportError> {
        let Some(topic) = &self.topics.data.point_bulk else {
            return Ok(());
        };
        let payload = serde_json::to_vec(&serialize_point_bulk(points))
            .expect("point payload always serializes");
        self.publisher
            .publish(&topic.topic, topic.qos, topic.retain, payload)
            .await
    }

    /// Enriches the heartbeat payload with `{timestamp, organization_id,
    /// site_id, iot_device_id}` at publish time, exactly where
    /// `publish_heartbeat_status` does it rather than at snapshot time, so
    /// the same snapshot can be reused for a forced and a scheduled beat.
    pub async fn publish_heartbeat(
        &self,
        identity: &DeviceIdentity,
        status: Value,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), crate::error::TransportError> {
        let mut payload = match status {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("status".to_string(), other);
                map
            }
        };
        payload.insert("timestamp".to_string(), json!(now.to_rfc3339()));
        payload.insert("organization_id".to_string(), json!(identity.organization_id));
        payload.insert("site_id".to_string(), json!(identity.site_id));
        payload.insert("iot_device_id".to_string(), json!(identity.iot_device_id));

        let topic = &self.topics.status.heartbeat;
        let body = serde_json::to_vec(&Value::Object(payload)).expect("heartbeat payload always serializes");
        self.publisher
            .publish(&topic.topic, topic.qos, topic.retain, body)
            .await
    }

    pub async fn publish_response(
        &self,
        topic: &crate::mqtt::topics::TopicConfig,
        payload: &Value,
    ) -> Result<(), crate::error::TransportError> {
        let body = serde_json::to_vec(payload).expect("response payload always serializes");
        self.publisher
            .publish(&topic.topic, topic.qos, topic.retain, body)
            .await
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::topics::{default_schema, build_mqtt_topic_dict, TopicIdentity};
    use crate::mqtt::RecordingPublisher;
    use chrono::Utc;
    use uuid::Uuid;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            organization_id: "org1".to_string(),
            site_id: "site1".to_string(),
            iot_device_id: "dev1".to_string(),
            controller_device_id: None,
            iot_device_point_id: None,
        }
    }

    fn sample_point() -> ControllerPoint {
        ControllerPoint {
            id: 1,
            iot_device_point_id: Uuid::nil(),
            controller_id: "c1".to_string(),
            object_type: "analogInput".to_string(),
            object_id: 1,
            present_value: Some(json!(72.5)),
            status_flags: Some("in-alarm;fault".to_string()),
            event_state: Some("normal".to_string()),
            out_of_service: Some(false),
            reliability: None,
            min_pres_value: None,
            max_pres_value: None,
            high_limit: None,
            low_limit: None,
            resolution: None,
            priority_array: None,
            relinquish_default: None,
            cov_increment: None,
            time_delay: None,
            time_delay_normal: None,
            notification_class: None,
            notify_type: None,
            deadband: None,
            limit_enable: None,
            event_enable: None,
            acked_transitions: None,
            event_time_stamps: None,
            event_message_texts: None,
            event_message_texts_config: None,
            event_detection_enable: None,
            event_algorithm_inhibit_ref: None,
            event_algorithm_inhibit: None,
            reliability_evaluation_inhibit: None,
            error_info: None,
            is_uploaded: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn serialize_point_splits_status_flags() {
        let serialized = serialize_point(&sample_point());
        assert_eq!(serialized["statusFlags"], json!(["in-alarm", "fault"]));
        assert!(serialized["createdAtUnixMilliTimestamp"].is_i64());
    }

    #[tokio::test]
    async fn publish_heartbeat_enriches_with_identity_and_timestamp() {
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
        let dispatcher = CommandDispatcher::new(publisher.clone(), topics);

        dispatcher
            .publish_heartbeat(&identity(), json!({"cpu": 10.0}), Utc::now())
            .await
            .unwrap();

        let calls = publisher.published.lock().await;
        assert_eq!(calls.len(), 1);
        let payload: Value = serde_json::from_slice(&calls[0].3).unwrap();
        assert_eq!(payload["organization_id"], json!("org1"));
        assert_eq!(payload["cpu"], json!(10.0));
        assert!(payload["timestamp"].is_string());
    }
}
