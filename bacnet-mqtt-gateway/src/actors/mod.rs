//! The actor message bus: one unbounded inbox per named actor, plus a
//! `Broadcast` pseudo-receiver that fans a message out to every other
//! registered actor.
//!
//! Grounded in the Python app's `actor_queue_registry` (a dict of asyncio
//! queues looked up by `ActorName`) used throughout `mqtt_actor.py` and
//! `mqtt_controller.py`.

pub mod messages;

pub use messages::{ActorMessage, ActorMessageType, ActorName, ActorPayload};

use std::collections::HashMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

pub struct ActorRegistry {
    senders: HashMap<ActorName, UnboundedSender<ActorMessage>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ActorRegistry {
    /// Builds inboxes for every named actor (excluding `Broadcast`, which is
    /// a fan-out target rather than a real inbox) and returns the registry
    /// plus each actor's receiver half.
    pub fn new() -> (Self, HashMap<ActorName, UnboundedReceiver<ActorMessage>>) {
        const ACTORS: &[ActorName] = &[
            ActorName::Mqtt,
            ActorName::Bacnet,
            ActorName::BacnetWriter,
            ActorName::Uploader,
            ActorName::Cleaner,
            ActorName::Heartbeat,
            ActorName::SystemMetrics,
        ];

        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for &name in ACTORS {
            let (tx, rx) = unbounded_channel();
            senders.insert(name, tx);
            receivers.insert(name, rx);
        }

        let (shutdown_tx, _) = watch::channel(false);

        (Self { senders, shutdown_tx }, receivers)
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Sends `message` to its declared receiver. `Broadcast` fans the
    /// message out to every registered actor except the sender.
    pub fn send(&self, message: ActorMessage) -> Result<(), String> {
        if message.receiver == ActorName::Broadcast {
            let mut errors = Vec::new();
            for (&name, tx) in &self.senders {
                if name == message.sender {
                    continue;
                }
                let mut copy = message.clone();
                copy.receiver = name;
                if tx.send(copy).is_err() {
                    errors.push(format!("{name:?}"));
                }
            }
            return if errors.is_empty() {
                Ok(())
            } else {
                Err(format!("broadcast delivery failed for: {}", errors.join(", ")))
            };
        }

        self.senders
            .get(&message.receiver)
            .ok_or_else(|| format!("no inbox registered for {:?}", message.receiver))?
            .send(message)
            .map_err(|e| e.to_string())
    }

    pub fn send_from(
        &self,
        sender: ActorName,
        receiver: ActorName,
        message_type: ActorMessageType,
        payload: ActorPayload,
    ) -> Result<(), String> {
        self.send(ActorMessage {
            sender,
            receiver,
            message_type,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messages::ForceHeartbeatPayload;

    #[tokio::test]
    async fn delivers_directly_addressed_message() {
        let (registry, mut receivers) = ActorRegistry::new();
        registry
            .send_from(
                ActorName::Mqtt,
                ActorName::Heartbeat,
                ActorMessageType::ForceHeartbeatRequest,
                ActorPayload::ForceHeartbeat(ForceHeartbeatPayload {}),
            )
            .unwrap();

        let rx = receivers.get_mut(&ActorName::Heartbeat).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.sender, ActorName::Mqtt);
        assert_eq!(received.receiver, ActorName::Heartbeat);
    }

    #[tokio::test]
    async fn broadcast_reaches_every_other_actor() {
        let (registry, mut receivers) = ActorRegistry::new();
        registry
            .send_from(
                ActorName::Mqtt,
                ActorName::Broadcast,
                ActorMessageType::ForceHeartbeatRequest,
                ActorPayload::ForceHeartbeat(ForceHeartbeatPayload {}),
            )
            .unwrap();

        for (&name, rx) in receivers.iter_mut() {
            if name == ActorName::Mqtt {
                assert!(rx.try_recv().is_err());
            } else {
                assert!(rx.try_recv().is_ok());
            }
        }
    }

    #[test]
    fn shutdown_signal_propagates() {
        let (registry, _receivers) = ActorRegistry::new();
        let mut signal = registry.shutdown_signal();
        assert!(!*signal.borrow());
        registry.shutdown();
        signal.has_changed().unwrap();
        assert!(*signal.borrow());
    }
}
