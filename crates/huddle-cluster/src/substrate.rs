//! The pub/sub substrate abstraction and the in-memory loopback.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use crate::envelope::ClusterEnvelope;

/// Errors from the cluster substrate.
#[derive(Debug, thiserror::Error)]
pub enum SubstrateError {
    /// A publish failed.
    #[error("publish failed: {0}")]
    Publish(String),

    /// Establishing a subscription failed.
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    /// Envelope (de)serialization failed.
    #[error("envelope encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result type for substrate operations.
pub type SubstrateResult<T> = Result<T, SubstrateError>;

/// A durable pub/sub channel shared by all replicas.
///
/// Contract: per-publisher FIFO within the topic, at-least-once delivery
/// to live subscribers. Subscribers receive every envelope including
/// their own — origin filtering is the bridge's job.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Publish one envelope to the cluster topic.
    async fn publish(&self, envelope: &ClusterEnvelope) -> SubstrateResult<()>;

    /// Open a subscription delivering every envelope on the topic.
    async fn subscribe(&self) -> SubstrateResult<mpsc::Receiver<ClusterEnvelope>>;
}

/// Capacity of the loopback channel and of subscriber queues.
const MEMORY_SUBSTRATE_CAPACITY: usize = 1024;

/// In-process loopback substrate for tests and single-node runs.
///
/// Cloning shares the underlying channel, so several bridges in one
/// process (e.g. a two-replica test) see each other's envelopes.
#[derive(Clone)]
pub struct MemorySubstrate {
    tx: broadcast::Sender<ClusterEnvelope>,
}

impl MemorySubstrate {
    /// Create a new loopback substrate.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(MEMORY_SUBSTRATE_CAPACITY);
        Self { tx }
    }
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    async fn publish(&self, envelope: &ClusterEnvelope) -> SubstrateResult<()> {
        // No subscribers is fine: a single-replica deployment publishes
        // into the void.
        let _ = self.tx.send(envelope.clone());
        Ok(())
    }

    async fn subscribe(&self) -> SubstrateResult<mpsc::Receiver<ClusterEnvelope>> {
        let mut rx = self.tx.subscribe();
        let (out_tx, out_rx) = mpsc::channel(MEMORY_SUBSTRATE_CAPACITY);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if out_tx.send(envelope).await.is_err() {
                            break;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(skipped = count, "Substrate subscriber lagged, envelopes dropped");
                    },
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(out_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::{ReplicaId, RetroId, UserId};

    #[tokio::test]
    async fn loopback_delivers_to_all_subscribers() {
        let substrate = MemorySubstrate::new();
        let mut rx1 = substrate.subscribe().await.unwrap();
        let mut rx2 = substrate.subscribe().await.unwrap();

        let envelope =
            ClusterEnvelope::presence_leave(ReplicaId::new(), RetroId::new(), UserId::new())
                .unwrap();
        substrate.publish(&envelope).await.unwrap();

        assert_eq!(rx1.recv().await.unwrap().room_id, envelope.room_id);
        assert_eq!(rx2.recv().await.unwrap().room_id, envelope.room_id);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let substrate = MemorySubstrate::new();
        let envelope =
            ClusterEnvelope::presence_leave(ReplicaId::new(), RetroId::new(), UserId::new())
                .unwrap();
        substrate.publish(&envelope).await.unwrap();
    }

    #[tokio::test]
    async fn per_publisher_fifo_is_preserved() {
        let substrate = MemorySubstrate::new();
        let mut rx = substrate.subscribe().await.unwrap();
        let origin = ReplicaId::new();
        let room = RetroId::new();
        let users: Vec<UserId> = (0..10).map(|_| UserId::new()).collect();
        for user in &users {
            let envelope = ClusterEnvelope::presence_leave(origin, room, *user).unwrap();
            substrate.publish(&envelope).await.unwrap();
        }
        for user in &users {
            let got = rx.recv().await.unwrap();
            let payload: crate::envelope::PresencePayload =
                serde_json::from_value(got.payload).unwrap();
            assert_eq!(payload.user_id, *user);
        }
    }
}
