//! MQTT transport: connects to the broker, keeps the event loop draining in
//! the background, and exposes a narrow publish capability to the rest of
//! the agent.
//!
//! Grounded in the teacher's `MqttService` (rumqttc client construction,
//! background `eventloop.poll()` loop with sleep-on-error backoff), adapted
//! from a Home-Assistant-discovery publisher into the cloud-platform
//! transport spec §4.3 describes.

pub mod dispatcher;
pub mod topics;

pub use dispatcher::CommandDispatcher;

use crate::config::MqttConfig;
use crate::error::TransportError;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, error};

/// One inbound publish the broker delivered on a subscribed topic, handed
/// to the command router for dispatch (mirrors `attach_to_client`'s
/// `_on_message` closure in `mqtt_command_dispatcher.py`).
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Narrow publish capability passed into the dispatcher instead of the
/// concrete `MqttTransport`, breaking the cyclic ownership the Python
/// version has between the dispatcher and the client that owns it
/// (spec's redesign notes).
#[async_trait]
pub trait MqttPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        qos: u8,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;
}

pub struct MqttTransport {
    client: AsyncClient,
}

impl MqttTransport {
    /// Connects to the broker and returns the transport alongside a
    /// receiver of every inbound publish on a topic the caller later
    /// subscribes to with `subscribe`.
    pub async fn connect(
        config: &MqttConfig,
        client_id: &str,
    ) -> Result<(Self, UnboundedReceiver<IncomingMessage>), TransportError> {
        if config.tls_enabled && config.ca_file.is_none() {
            return Err(TransportError::MissingCaFile(
                "tls_enabled is set but no ca_file configured".to_string(),
            ));
        }

        let mut options = MqttOptions::new(client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(config.keepalive_secs));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);
        let (incoming_tx, incoming_rx) = unbounded_channel();

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        debug!(topic = %publish.topic, "mqtt message received");
                        let _ = incoming_tx.send(IncomingMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        });
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt event loop error, reconnecting");
                        tokio::time::sleep(reconnect_delay).await;
                    }
                }
            }
        });

        Ok((Self { client }, incoming_rx))
    }

    pub async fn subscribe(&self, topic: &str, qos: u8) -> Result<(), TransportError> {
        let qos = match qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        };
        self.client
            .subscribe(topic, qos)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))
    }
}

#[async_trait]
impl MqttPublisher for MqttTransport {
    async fn publish(
        &self,
        topic: &str,
        qos: u8,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let qos = match qos {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::ExactlyOnce,
        };
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }
}

/// In-memory publisher used by tests: records every publish call instead of
/// touching the network.
#[cfg(any(test, feature = "test-util"))]
pub struct RecordingPublisher {
    pub published: tokio::sync::Mutex<Vec<(String, u8, bool, Vec<u8>)>>,
}

#[cfg(any(test, feature = "test-util"))]
impl RecordingPublisher {
    pub fn new() -> Self {
        Self {
            published: tokio::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl MqttPublisher for RecordingPublisher {
    async fn publish(
        &self,
        topic: &str,
        qos: u8,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.published
            .lock()
            .await
            .push((topic.to_string(), qos, retain, payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_publisher_captures_calls() {
        let publisher = RecordingPublisher::new();
        publisher
            .publish("topic/a", 0, false, b"hello".to_vec())
            .await
            .unwrap();
        let calls = publisher.published.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "topic/a");
    }

    #[tokio::test]
    async fn connect_rejects_tls_without_ca_file() {
        let mut config = MqttConfig::default();
        config.tls_enabled = true;
        config.ca_file = None;
        let err = MqttTransport::connect(&config, "client-1")
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, TransportError::MissingCaFile(_)));
    }
}
