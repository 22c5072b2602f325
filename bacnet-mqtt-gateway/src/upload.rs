//! The uploader pipeline: batches pending points, publishes them, and marks
//! them uploaded on success. A separate cleanup tick deletes uploaded rows.
//!
//! Grounded in spec §4.5 and the batching/serialization behavior of
//! `mqtt_command_dispatcher.py`'s `publish_point_bulk`. Delivery is
//! at-least-once: a point stays pending (and gets republished) until its
//! publish call returns success, and `mark_uploaded` only ever moves
//! `is_uploaded` from false to true.

use crate::mqtt::dispatcher::{serialize_point_bulk, CommandDispatcher};
use crate::store::PointStore;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_BATCH_ROW_LIMIT: i64 = 200;
pub const SERIALIZED_SIZE_WARN_BYTES: usize = 10 * 1024;

pub struct Uploader {
    store: Arc<PointStore>,
    dispatcher: Arc<CommandDispatcher>,
    batch_row_limit: i64,
}

pub struct UploadCycleStats {
    pub batches_published: usize,
    pub points_uploaded: usize,
}

impl Uploader {
    pub fn new(store: Arc<PointStore>, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            batch_row_limit: DEFAULT_BATCH_ROW_LIMIT,
        }
    }

    pub fn with_batch_row_limit(mut self, limit: i64) -> Self {
        self.batch_row_limit = limit;
        self
    }

    /// One upload tick: fetch pending points bounded by row count, publish
    /// as a single bulk payload, and mark only the published rows uploaded.
    /// A batch whose serialized size crosses the warn threshold is still
    /// published whole; the threshold exists to size the next batch
    /// smaller, not to reject the current one.
    pub async fn run_once(&self) -> Result<UploadCycleStats, crate::error::StoreError> {
        let pending = self.store.get_pending(self.batch_row_limit).await?;
        if pending.is_empty() {
            return Ok(UploadCycleStats {
                batches_published: 0,
                points_uploaded: 0,
            });
        }

        let payload = serialize_point_bulk(&pending);
        let serialized_len = serde_json::to_vec(&payload).map(|v| v.len()).unwrap_or(0);
        if serialized_len > SERIALIZED_SIZE_WARN_BYTES {
            warn!(
                bytes = serialized_len,
                rows = pending.len(),
                "upload batch exceeds size warning threshold"
            );
        }

        match self.dispatcher.publish_point_bulk(&pending).await {
            Ok(()) => {
                let ids: Vec<i64> = pending.iter().map(|p| p.id).collect();
                self.store
                    .mark_uploaded(&ids)
                    .await
                    .map_err(|e| crate::error::StoreError::Fatal(e.to_string()))?;
                info!(rows = ids.len(), "upload batch published and marked uploaded");
                Ok(UploadCycleStats {
                    batches_published: 1,
                    points_uploaded: ids.len(),
                })
            }
            Err(e) => {
                // at-least-once: leave rows pending, they will be retried
                // on the next tick.
                warn!(error = %e, rows = pending.len(), "upload publish failed, rows remain pending");
                Ok(UploadCycleStats {
                    batches_published: 0,
                    points_uploaded: 0,
                })
            }
        }
    }

    /// Deletes uploaded rows. Runs on its own interval, separate from
    /// `run_once`, so a slow cleanup never blocks fresh uploads.
    pub async fn cleanup_uploaded(&self) -> Result<u64, crate::error::StoreError> {
        self.store.delete_uploaded().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::topics::{build_mqtt_topic_dict, default_schema, TopicIdentity};
    use crate::mqtt::RecordingPublisher;
    use crate::store::NewControllerPoint;

    async fn test_uploader() -> (tempfile::TempDir, Uploader, Arc<PointStore>, Arc<RecordingPublisher>) {
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
        let uploader = Uploader::new(store.clone(), dispatcher);
        (dir, uploader, store, publisher)
    }

    fn sample_point(controller_id: &str, point_id: u32) -> NewControllerPoint {
        NewControllerPoint {
            iot_device_point_id: crate::ids::iot_device_point_id(controller_id, point_id),
            controller_id: controller_id.to_string(),
            object_type: "analogInput".to_string(),
            object_id: point_id,
            present_value: Some(serde_json::json!(1.0)),
            status_flags: None,
            event_state: None,
            out_of_service: None,
            reliability: None,
            error_info: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn run_once_marks_published_points_uploaded() {
        let (_dir, uploader, store, publisher) = test_uploader().await;
        store.insert(&sample_point("c1", 1)).await.unwrap();
        store.insert(&sample_point("c1", 2)).await.unwrap();

        let stats = uploader.run_once().await.unwrap();
        assert_eq!(stats.points_uploaded, 2);
        assert_eq!(publisher.published.lock().await.len(), 1);

        let pending = store.get_pending(10).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn run_once_is_noop_when_nothing_pending() {
        let (_dir, uploader, _store, publisher) = test_uploader().await;
        let stats = uploader.run_once().await.unwrap();
        assert_eq!(stats.batches_published, 0);
        assert!(publisher.published.lock().await.is_empty());
    }

    #[tokio::test]
    async fn cleanup_only_deletes_uploaded_rows() {
        let (_dir, uploader, store, _publisher) = test_uploader().await;
        store.insert(&sample_point("c1", 1)).await.unwrap();
        uploader.run_once().await.unwrap();
        store.insert(&sample_point("c1", 2)).await.unwrap();

        let deleted = uploader.cleanup_uploaded().await.unwrap();
        assert_eq!(deleted, 1);
        let remaining = store.get_by_controller("c1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(!remaining[0].is_uploaded);
    }
}
