//! Redis pub/sub substrate adapter.
//!
//! Redis pub/sub gives per-publisher FIFO on a channel and fire-and-forget
//! delivery to live subscribers, which matches the substrate contract:
//! missed envelopes are reconciled by the fresh snapshot a client gets on
//! rejoin and by the periodic presence syncs.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use crate::envelope::ClusterEnvelope;
use crate::substrate::{Substrate, SubstrateError, SubstrateResult};

/// Capacity of the subscriber's delivery queue.
const DELIVERY_QUEUE_CAPACITY: usize = 1024;

/// Cluster substrate over Redis pub/sub.
pub struct RedisSubstrate {
    client: redis::Client,
    topic: String,
    /// Cached multiplexed connection for publishes; dropped on error so
    /// the next publish reconnects.
    publish_conn: Mutex<Option<redis::aio::MultiplexedConnection>>,
}

impl RedisSubstrate {
    /// Create a substrate for the given Redis URL and topic.
    ///
    /// Connections are opened lazily on first use.
    pub fn new(url: &str, topic: impl Into<String>) -> SubstrateResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| SubstrateError::Subscribe(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            topic: topic.into(),
            publish_conn: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Substrate for RedisSubstrate {
    async fn publish(&self, envelope: &ClusterEnvelope) -> SubstrateResult<()> {
        let json = serde_json::to_string(envelope)?;

        let mut guard = self.publish_conn.lock().await;
        if guard.is_none() {
            debug!("Opening redis publish connection");
            let conn = self
                .client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| SubstrateError::Publish(e.to_string()))?;
            *guard = Some(conn);
        }
        // The connection was just installed above when absent.
        let Some(conn) = guard.as_mut() else {
            return Err(SubstrateError::Publish("no connection".into()));
        };
        let result: Result<(), redis::RedisError> = conn.publish(&self.topic, json).await;
        if let Err(e) = result {
            // Drop the broken connection; the next publish reconnects.
            *guard = None;
            return Err(SubstrateError::Publish(e.to_string()));
        }
        Ok(())
    }

    async fn subscribe(&self) -> SubstrateResult<mpsc::Receiver<ClusterEnvelope>> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| SubstrateError::Subscribe(e.to_string()))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(&self.topic)
            .await
            .map_err(|e| SubstrateError::Subscribe(e.to_string()))?;
        info!(topic = %self.topic, "Subscribed to cluster substrate");

        let (tx, rx) = mpsc::channel(DELIVERY_QUEUE_CAPACITY);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "Unreadable substrate message, skipping");
                        continue;
                    },
                };
                match serde_json::from_str::<ClusterEnvelope>(&payload) {
                    Ok(envelope) => {
                        if tx.send(envelope).await.is_err() {
                            // Receiver gone: the bridge shut down.
                            break;
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "Undecodable cluster envelope, skipping");
                    },
                }
            }
            error!("Cluster substrate subscription ended");
        });
        Ok(rx)
    }
}
