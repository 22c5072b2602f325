//! The monitoring actor: the core polling cycle that reads every active
//! controller's points and persists them, plus the monitoring state machine
//! that the MQTT command dispatcher drives through start/stop requests.
//!
//! Grounded in `monitor.py`'s `BACnetMonitor.monitor_all_devices`: one
//! wrapper acquired per controller (not per point), a single bulk read per
//! cycle, falling back to per-point reads when the bulk read itself fails,
//! and a second fallback (`read_properties` then `read_present_value`) for
//! any individual point whose bulk result came back empty. The
//! INITIALIZING/ACTIVE/STOPPED/ERROR state machine and its
//! upsert-status-then-force-heartbeat transition behavior are grounded in
//! the same module's `_handle_start_monitoring_request` /
//! `_handle_stop_monitoring_request`.

use crate::actors::messages::{ForceHeartbeatPayload, MonitoringControlPayload, MonitoringControlResponsePayload};
use crate::actors::{ActorMessageType, ActorName, ActorPayload, ActorRegistry};
use crate::bacnet::types::{available_device_properties, BacnetObjectType, PointRequest};
use crate::bacnet::{convert_bacnet_health_value, ReaderPool};
use crate::error::ReaderError;
use crate::ids::iot_device_point_id;
use crate::store::models::{ConnectionStatus, DeviceStatusSnapshot, MonitoringStatus};
use crate::store::{NewControllerPoint, PointStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, instrument, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub controller_id: String,
    pub device_instance: u32,
    pub points: Vec<PointConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointConfig {
    pub point_id: u32,
    pub object_type: BacnetObjectType,
    pub object_properties: Option<serde_json::Map<String, Value>>,
}

pub struct Monitor {
    pool: Arc<ReaderPool>,
    store: Arc<PointStore>,
    state: Mutex<MonitoringStatus>,
    registry: Mutex<Option<Arc<ActorRegistry>>>,
}

pub struct MonitorCycleStats {
    pub inserted: usize,
    pub fallback_individual: usize,
    pub dropped: usize,
}

impl Monitor {
    pub fn new(pool: Arc<ReaderPool>, store: Arc<PointStore>) -> Self {
        Self {
            pool,
            store,
            state: Mutex::new(MonitoringStatus::Initializing),
            registry: Mutex::new(None),
        }
    }

    /// Wires the actor bus in so state transitions can force an
    /// out-of-band heartbeat. Optional: a `Monitor` built without one still
    /// tracks state and persists snapshots, it just can't notify Heartbeat.
    pub async fn attach_registry(&self, registry: Arc<ActorRegistry>) {
        *self.registry.lock().await = Some(registry);
    }

    pub async fn status(&self) -> MonitoringStatus {
        *self.state.lock().await
    }

    /// `START_MONITORING_REQUEST` handler: (re)activates the polling cycle.
    pub async fn start_monitoring(&self, _request: MonitoringControlPayload) -> MonitoringControlResponsePayload {
        self.transition(MonitoringStatus::Active).await;
        MonitoringControlResponsePayload {
            success: true,
            message: "monitoring active".to_string(),
        }
    }

    /// `STOP_MONITORING_REQUEST` handler: the next `monitor_all_devices`
    /// call becomes a no-op until monitoring is restarted.
    pub async fn stop_monitoring(&self, _request: MonitoringControlPayload) -> MonitoringControlResponsePayload {
        self.transition(MonitoringStatus::Stopped).await;
        MonitoringControlResponsePayload {
            success: true,
            message: "monitoring stopped".to_string(),
        }
    }

    /// Moves to `next`, upserts a status snapshot, and forces a heartbeat so
    /// the new state is visible immediately rather than on the next timer
    /// tick (mirrors the original's transition handler exactly).
    async fn transition(&self, next: MonitoringStatus) {
        *self.state.lock().await = next;

        let snapshot = DeviceStatusSnapshot {
            cpu: None,
            memory: None,
            disk: None,
            temperature: None,
            uptime: None,
            load: None,
            monitoring_status: next,
            mqtt_connection_status: ConnectionStatus::Connected,
            bacnet_connection_status: bacnet_connection_status(&self.pool).await,
            bacnet_devices_connected: self.pool.get_all().await.len() as i64,
            bacnet_points_monitored: 0,
        };
        if let Err(e) = self.store.record_device_status(&snapshot).await {
            error!(error = %e, "failed to persist monitoring status transition");
        }

        if let Some(registry) = self.registry.lock().await.as_ref() {
            if let Err(e) = registry.send_from(
                ActorName::Bacnet,
                ActorName::Heartbeat,
                ActorMessageType::ForceHeartbeatRequest,
                ActorPayload::ForceHeartbeat(ForceHeartbeatPayload {}),
            ) {
                warn!(error = %e, "failed to notify heartbeat actor of monitoring state transition");
            }
        }
    }

    /// Runs one full monitoring pass across every configured controller.
    /// A no-op while explicitly `Stopped`; otherwise promotes `Initializing`
    /// to `Active` on first success, or to `Error` if every point in the
    /// cycle was dropped.
    #[instrument(skip(self, controllers))]
    pub async fn monitor_all_devices(
        &self,
        controllers: &[ControllerConfig],
    ) -> MonitorCycleStats {
        if *self.state.lock().await == MonitoringStatus::Stopped {
            return MonitorCycleStats {
                inserted: 0,
                fallback_individual: 0,
                dropped: 0,
            };
        }

        self.pool.log_utilization("wrapper utilization before monitor cycle").await;

        let mut stats = MonitorCycleStats {
            inserted: 0,
            fallback_individual: 0,
            dropped: 0,
        };

        for controller in controllers {
            self.monitor_controller(controller, &mut stats).await;
        }

        self.pool.log_utilization("wrapper utilization after monitor cycle").await;

        let total_points: usize = controllers.iter().map(|c| c.points.len()).sum();
        let current = *self.state.lock().await;
        if current != MonitoringStatus::Stopped {
            if total_points > 0 && stats.inserted == 0 && stats.dropped == total_points {
                self.transition(MonitoringStatus::Error).await;
            } else if current == MonitoringStatus::Initializing {
                self.transition(MonitoringStatus::Active).await;
            }
        }

        stats
    }

    async fn monitor_controller(&self, controller: &ControllerConfig, stats: &mut MonitorCycleStats) {
        let wrapper = match self.pool.get_for_controller(&controller.controller_id).await {
            Ok(w) => w,
            Err(e) => {
                error!(controller = %controller.controller_id, error = %e, "no wrapper available, skipping controller this cycle");
                stats.dropped += controller.points.len();
                return;
            }
        };

        let requests: Vec<PointRequest> = controller
            .points
            .iter()
            .map(|p| PointRequest {
                object_type: p.object_type,
                object_id: p.point_id,
                properties: available_device_properties(p.object_properties.as_ref()),
            })
            .collect();

        match wrapper.read_multiple_points(controller.device_instance, &requests).await {
            Ok(bulk_result) => {
                let mut to_insert = Vec::new();
                let mut fallback_points = Vec::new();

                for point in &controller.points {
                    let key = format!("{}:{}", point.object_type, point.point_id);
                    match bulk_result.get(&key) {
                        Some(props) if !props.is_empty() => {
                            to_insert.push(self.build_row(controller, point, props));
                        }
                        _ => fallback_points.push(point.clone()),
                    }
                }

                match self.store.bulk_insert(&to_insert).await {
                    Ok(_) => stats.inserted += to_insert.len(),
                    Err(e) => {
                        warn!(controller = %controller.controller_id, error = %e, "bulk insert failed, falling back to per-row insert");
                        for row in &to_insert {
                            match self.store.insert(row).await {
                                Ok(_) => stats.inserted += 1,
                                Err(e) => {
                                    error!(controller = %controller.controller_id, point = row.object_id, error = %e, "per-row insert failed, dropping point for this cycle");
                                    stats.dropped += 1;
                                }
                            }
                        }
                    }
                }

                for point in fallback_points {
                    self.fallback_individual_read(&wrapper, controller, &point, stats).await;
                }
            }
            Err(e) if e.is_fatal_for_operation() => {
                error!(controller = %controller.controller_id, error = %e, "bulk read failed, falling back to per-point reads for entire controller");
                for point in &controller.points {
                    self.fallback_individual_read(&wrapper, controller, point, stats).await;
                }
            }
            Err(e) => {
                error!(controller = %controller.controller_id, error = %e, "bulk read transport error");
                stats.dropped += controller.points.len();
            }
        }
    }

    /// Tries `read_properties` first, then `read_present_value` as a second
    /// fallback; a point that fails both is silently dropped for this cycle
    /// rather than producing a partial/garbage row (mirrors
    /// `_fallback_individual_read`).
    async fn fallback_individual_read(
        &self,
        wrapper: &crate::bacnet::SharedWrapper,
        controller: &ControllerConfig,
        point: &PointConfig,
        stats: &mut MonitorCycleStats,
    ) {
        stats.fallback_individual += 1;

        let request = PointRequest {
            object_type: point.object_type,
            object_id: point.point_id,
            properties: available_device_properties(point.object_properties.as_ref()),
        };

        let props = match wrapper.read_properties(controller.device_instance, &request).await {
            Ok(props) if !props.is_empty() => props,
            _ => match wrapper
                .read_present_value(controller.device_instance, point.object_type, point.point_id)
                .await
            {
                Ok(value) => {
                    let mut props = std::collections::HashMap::new();
                    props.insert("presentValue".to_string(), value);
                    props
                }
                Err(e) => {
                    warn!(
                        controller = %controller.controller_id,
                        point = point.point_id,
                        error = %e,
                        "fallback read failed on both properties and presentValue, dropping point"
                    );
                    stats.dropped += 1;
                    return;
                }
            },
        };

        let row = self.build_row(controller, point, &props);
        if let Err(e) = self.store.insert(&row).await {
            error!(controller = %controller.controller_id, point = point.point_id, error = %e, "fallback insert failed");
            stats.dropped += 1;
        } else {
            stats.inserted += 1;
        }
    }

    /// Builds a storable row from a read result, routing the BACnet-typed
    /// scalars through `convert_bacnet_health_value` first so raw
    /// enumerations/integers never reach the store untranslated.
    fn build_row(
        &self,
        controller: &ControllerConfig,
        point: &PointConfig,
        props: &std::collections::HashMap<String, Value>,
    ) -> NewControllerPoint {
        let convert = |name: &str| props.get(name).cloned().map(|v| convert_bacnet_health_value(name, v));

        let status_flags = convert("statusFlags").and_then(|v| v.as_str().map(String::from));
        let event_state = convert("eventState").and_then(|v| v.as_str().map(String::from));
        let out_of_service = convert("outOfService").and_then(|v| v.as_bool());
        let reliability = convert("reliability").and_then(|v| v.as_str().map(String::from));

        NewControllerPoint {
            iot_device_point_id: iot_device_point_id(&controller.controller_id, point.point_id),
            controller_id: controller.controller_id.clone(),
            object_type: point.object_type.as_canonical().to_string(),
            object_id: point.point_id,
            present_value: props.get("presentValue").cloned(),
            status_flags,
            event_state,
            out_of_service,
            reliability,
            error_info: None,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Observed connection health used for heartbeat enrichment (spec §4.7).
pub async fn bacnet_connection_status(pool: &ReaderPool) -> ConnectionStatus {
    let wrappers = pool.get_all().await;
    if wrappers.is_empty() {
        return ConnectionStatus::Disconnected;
    }
    if wrappers.iter().any(|w| w.is_connected()) {
        ConnectionStatus::Connected
    } else {
        ConnectionStatus::Disconnected
    }
}

pub fn monitoring_status_from_error(err: Option<&ReaderError>) -> MonitoringStatus {
    match err {
        None => MonitoringStatus::Active,
        Some(_) => MonitoringStatus::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bacnet::BalancerStrategy;
    use crate::config::BacnetReaderConfig;

    async fn test_monitor() -> (tempfile::TempDir, Monitor, Arc<ReaderPool>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PointStore::connect(dir.path().join("db.sqlite").to_str().unwrap()).await.unwrap());
        let pool = Arc::new(ReaderPool::new(BalancerStrategy::RoundRobin));
        pool.initialize(&[BacnetReaderConfig {
            id: "r1".to_string(),
            ip_address: "127.0.0.1".parse().unwrap(),
            subnet_mask: 24,
            bacnet_device_id: 1,
            port: 47808,
            bbmd_enabled: false,
            bbmd_server_ip: None,
            is_active: true,
        }])
        .await
        .unwrap();
        (dir, Monitor::new(pool.clone(), store), pool)
    }

    #[tokio::test]
    async fn monitor_cycle_drops_points_when_no_device_answers() {
        // no real BACnet device is listening on the loopback reader, so the
        // bulk read and both individual fallbacks all time out; the point
        // is dropped for the cycle rather than a partial row being stored.
        let (_dir, monitor, _pool) = test_monitor().await;
        let controllers = vec![ControllerConfig {
            controller_id: "c1".to_string(),
            device_instance: 100,
            points: vec![PointConfig {
                point_id: 1,
                object_type: BacnetObjectType::AnalogInput,
                object_properties: None,
            }],
        }];

        let stats = monitor.monitor_all_devices(&controllers).await;
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn no_wrapper_available_drops_controller_points() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PointStore::connect(dir.path().join("db.sqlite").to_str().unwrap()).await.unwrap());
        let pool = Arc::new(ReaderPool::new(BalancerStrategy::RoundRobin));
        let monitor = Monitor::new(pool, store);

        let controllers = vec![ControllerConfig {
            controller_id: "c1".to_string(),
            device_instance: 100,
            points: vec![PointConfig {
                point_id: 1,
                object_type: BacnetObjectType::AnalogInput,
                object_properties: None,
            }],
        }];

        let stats = monitor.monitor_all_devices(&controllers).await;
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn stopped_monitor_skips_the_cycle_entirely() {
        let (_dir, monitor, _pool) = test_monitor().await;
        monitor
            .stop_monitoring(MonitoringControlPayload { reader_id: None })
            .await;

        let controllers = vec![ControllerConfig {
            controller_id: "c1".to_string(),
            device_instance: 100,
            points: vec![PointConfig {
                point_id: 1,
                object_type: BacnetObjectType::AnalogInput,
                object_properties: None,
            }],
        }];

        let stats = monitor.monitor_all_devices(&controllers).await;
        assert_eq!(stats.inserted, 0);
        assert_eq!(stats.dropped, 0);
        assert_eq!(monitor.status().await, MonitoringStatus::Stopped);
    }

    #[tokio::test]
    async fn start_monitoring_activates_and_persists_snapshot() {
        let (_dir, monitor, _pool) = test_monitor().await;
        let response = monitor
            .start_monitoring(MonitoringControlPayload { reader_id: None })
            .await;
        assert!(response.success);
        assert_eq!(monitor.status().await, MonitoringStatus::Active);
    }

    #[tokio::test]
    async fn build_row_routes_health_properties_through_conversion() {
        let (_dir, monitor, _pool) = test_monitor().await;
        let controller = ControllerConfig {
            controller_id: "c1".to_string(),
            device_instance: 1,
            points: vec![],
        };
        let point = PointConfig {
            point_id: 1,
            object_type: BacnetObjectType::AnalogInput,
            object_properties: None,
        };
        let mut props = std::collections::HashMap::new();
        props.insert("eventState".to_string(), serde_json::json!(0));
        props.insert("outOfService".to_string(), serde_json::json!(1));
        props.insert("presentValue".to_string(), serde_json::json!(72.5));

        let row = monitor.build_row(&controller, &point, &props);
        assert_eq!(row.event_state, Some("0".to_string()));
        assert_eq!(row.out_of_service, Some(true));
        assert_eq!(row.present_value, Some(serde_json::json!(72.5)));
    }
}
