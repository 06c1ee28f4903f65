//! Pub/sub transports carrying invalidation payloads between instances.
//!
//! The bus assumes at-most-once, fire-and-forget delivery and nothing more:
//! payloads may be lost, duplicated or reordered across keys.

use std::pin::Pin;

use async_trait::async_trait;
use deadpool_redis::Pool;
use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use tokio::sync::broadcast;

/// Stream of raw payloads received on one channel.
pub type PayloadStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Errors raised by a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to get Redis connection: {0}")]
    Pool(String),

    #[error("transport closed")]
    Closed,
}

/// A broadcast channel shared by every instance.
#[async_trait]
pub trait InvalidationTransport: Send + Sync + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Send one payload to every subscriber of `channel`.
    async fn send(&self, channel: &str, payload: String) -> Result<(), TransportError>;

    /// Start receiving payloads sent to `channel`.
    ///
    /// The stream ends when the underlying connection is lost.
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, TransportError>;
}

/// Redis `PUBLISH`/`SUBSCRIBE`.
///
/// Publishing borrows a pooled connection; each subscription opens a
/// dedicated connection, since a subscribed Redis connection cannot issue
/// other commands.
pub struct RedisTransport {
    pool: Pool,
    url: String,
}

impl RedisTransport {
    pub fn new(pool: Pool, url: impl Into<String>) -> Self {
        Self {
            pool,
            url: url.into(),
        }
    }
}

#[async_trait]
impl InvalidationTransport for RedisTransport {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn send(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| TransportError::Pool(e.to_string()))?;
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, TransportError> {
        // Create a dedicated Redis client for pub/sub
        let client = redis::Client::open(self.url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read invalidation payload");
                    crate::metrics::record_invalidation_dropped("unreadable");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

/// In-process transport over a tokio broadcast channel.
///
/// Clones share one channel, so several coordinators in the same process
/// behave like separate instances connected to the same broker.
#[derive(Clone)]
pub struct LocalTransport {
    sender: broadcast::Sender<(String, String)>,
}

impl LocalTransport {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl InvalidationTransport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn send(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        // No receivers is not an error: nobody is listening yet
        let _ = self.sender.send((channel.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, TransportError> {
        let receiver = self.sender.subscribe();
        let channel = channel.to_string();

        let stream = futures_util::stream::unfold(receiver, move |mut receiver| {
            let channel = channel.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok((target, payload)) if target == channel => {
                            return Some((payload, receiver));
                        }
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "invalidation receiver lagged, messages lost");
                            crate::metrics::record_invalidation_dropped("lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
