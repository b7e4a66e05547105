//! # Messaging Substrate
//!
//! The [`Broker`] trait is the boundary to the message-queue substrate. The
//! runtime never reaches for an ambient connection: every component receives
//! an `Arc<dyn Broker>` at construction.
//!
//! Two delivery shapes exist:
//!
//! - **Queues** - named FIFO channels with competing consumers: a message is
//!   delivered to exactly one consumer. Private process queues and the
//!   spawn-assignment queue are queues.
//! - **Fanouts** - broadcast channels: every subscriber sees every message.
//!   The modules queue is a fanout so all worker hosts cache new modules.
//!
//! All queues are transient. Delivery is at-most-once, best-effort: sending
//! to a queue that does not exist (or was deleted) is a silent no-op, which
//! is exactly the fate of messages addressed to a terminated process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::error::ClusterError;

/// Handle for pulling from a queue. Clones of one consumer (and independent
/// `consume` calls on the same queue) compete for messages.
#[derive(Clone)]
pub struct QueueConsumer {
    inner: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl QueueConsumer {
    /// Next message, or `None` once the queue has been deleted and drained.
    pub async fn recv(&self) -> Option<String> {
        self.inner.lock().await.recv().await
    }
}

/// Handle for one subscription to a fanout.
pub struct FanoutConsumer {
    inner: broadcast::Receiver<String>,
}

impl FanoutConsumer {
    /// Next broadcast message, or `None` once the fanout is gone. A lagged
    /// subscriber skips ahead rather than erroring out; dropped
    /// notifications are re-derivable from the registry.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.inner.recv().await {
                Ok(body) => return Some(body),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// The messaging capability injected into every component.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Create the queue if it does not exist. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), ClusterError>;

    /// Drop the queue. Later sends to it become no-ops.
    async fn delete_queue(&self, queue: &str) -> Result<(), ClusterError>;

    /// Fire-and-forget enqueue. Undeliverable messages are dropped.
    async fn send_to_queue(&self, queue: &str, body: String) -> Result<(), ClusterError>;

    /// Start consuming a queue as one of its competing consumers.
    async fn consume(&self, queue: &str) -> Result<QueueConsumer, ClusterError>;

    /// Create the fanout if it does not exist. Idempotent.
    async fn declare_fanout(&self, fanout: &str) -> Result<(), ClusterError>;

    /// Broadcast to every current subscriber of the fanout.
    async fn publish(&self, fanout: &str, body: String) -> Result<(), ClusterError>;

    /// Subscribe to a fanout; only messages published after this call are
    /// observed.
    async fn subscribe(&self, fanout: &str) -> Result<FanoutConsumer, ClusterError>;
}

struct QueueEntry {
    sender: mpsc::UnboundedSender<String>,
    consumer: QueueConsumer,
}

/// In-process broker backed by tokio channels. One instance is shared by
/// every component of a single-host cluster; it is also what the tests run
/// against.
#[derive(Default)]
pub struct MemoryBroker {
    queues: Mutex<HashMap<String, QueueEntry>>,
    fanouts: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<(), ClusterError> {
        let mut queues = self.queues.lock().map_err(|_| ClusterError::BrokerClosed)?;
        queues.entry(queue.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            QueueEntry {
                sender,
                consumer: QueueConsumer {
                    inner: Arc::new(tokio::sync::Mutex::new(receiver)),
                },
            }
        });
        Ok(())
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), ClusterError> {
        let mut queues = self.queues.lock().map_err(|_| ClusterError::BrokerClosed)?;
        queues.remove(queue);
        Ok(())
    }

    async fn send_to_queue(&self, queue: &str, body: String) -> Result<(), ClusterError> {
        let queues = self.queues.lock().map_err(|_| ClusterError::BrokerClosed)?;
        match queues.get(queue) {
            Some(entry) => {
                // Receiver gone means the last consumer hung up; same
                // best-effort outcome as a missing queue.
                let _ = entry.sender.send(body);
            }
            None => debug!(queue, "dropping message for missing queue"),
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<QueueConsumer, ClusterError> {
        self.declare_queue(queue).await?;
        let queues = self.queues.lock().map_err(|_| ClusterError::BrokerClosed)?;
        queues
            .get(queue)
            .map(|entry| entry.consumer.clone())
            .ok_or(ClusterError::BrokerClosed)
    }

    async fn declare_fanout(&self, fanout: &str) -> Result<(), ClusterError> {
        let mut fanouts = self
            .fanouts
            .lock()
            .map_err(|_| ClusterError::BrokerClosed)?;
        fanouts
            .entry(fanout.to_string())
            .or_insert_with(|| broadcast::channel(256).0);
        Ok(())
    }

    async fn publish(&self, fanout: &str, body: String) -> Result<(), ClusterError> {
        let fanouts = self
            .fanouts
            .lock()
            .map_err(|_| ClusterError::BrokerClosed)?;
        if let Some(sender) = fanouts.get(fanout) {
            // No subscribers is fine; workers that come up later re-read the
            // module registry instead.
            let _ = sender.send(body);
        } else {
            debug!(fanout, "dropping broadcast for missing fanout");
        }
        Ok(())
    }

    async fn subscribe(&self, fanout: &str) -> Result<FanoutConsumer, ClusterError> {
        self.declare_fanout(fanout).await?;
        let fanouts = self
            .fanouts
            .lock()
            .map_err(|_| ClusterError::BrokerClosed)?;
        fanouts
            .get(fanout)
            .map(|sender| FanoutConsumer {
                inner: sender.subscribe(),
            })
            .ok_or(ClusterError::BrokerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_preserves_fifo_order() {
        let broker = MemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        let consumer = broker.consume("q").await.unwrap();
        for i in 0..5 {
            broker.send_to_queue("q", format!("m{i}")).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(consumer.recv().await.unwrap(), format!("m{i}"));
        }
    }

    #[tokio::test]
    async fn send_to_missing_queue_is_a_noop() {
        let broker = MemoryBroker::new();
        broker
            .send_to_queue("gone", "lost".into())
            .await
            .expect("undeliverable send must not error");
    }

    #[tokio::test]
    async fn competing_consumers_split_the_stream() {
        let broker = MemoryBroker::new();
        broker.declare_queue("q").await.unwrap();
        let a = broker.consume("q").await.unwrap();
        let b = broker.consume("q").await.unwrap();
        broker.send_to_queue("q", "m0".into()).await.unwrap();
        broker.send_to_queue("q", "m1".into()).await.unwrap();
        // Whichever consumer polls gets the next message exactly once.
        let first = a.recv().await.unwrap();
        let second = b.recv().await.unwrap();
        assert_eq!(first, "m0");
        assert_eq!(second, "m1");
    }

    #[tokio::test]
    async fn fanout_reaches_every_subscriber() {
        let broker = MemoryBroker::new();
        broker.declare_fanout("f").await.unwrap();
        let mut a = broker.subscribe("f").await.unwrap();
        let mut b = broker.subscribe("f").await.unwrap();
        broker.publish("f", "hello".into()).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), "hello");
        assert_eq!(b.recv().await.unwrap(), "hello");
    }
}
