//! Cross-instance cache invalidation over a pub/sub transport.
//!
//! ## How It Works
//!
//! 1. A write commits, then evicts its keys locally and hands one
//!    [`InvalidationMessage`] per key to the [`InvalidationPublisher`]
//! 2. A background worker serializes and sends each message on the channel
//! 3. Every instance's listener decodes the payload and calls its
//!    [`InvalidationHandler`], which evicts the key from local L1
//!
//! ```text
//! Instance 1: commit → evict "products:42" → publish
//!   ↓
//! Channel: {"cacheName":"products","key":"42"}
//!   ↓
//! Instance 2: listener → evict "products:42" from L1
//! Instance 1: listener → evict again (harmless)
//! ```
//!
//! Publishing never blocks and never fails the caller. Between one
//! instance's commit and a sibling's handling of the message, the sibling
//! may still serve the old value; that window is bounded by transport
//! latency plus queueing and is not closed by this module.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::message::InvalidationMessage;
use super::transport::InvalidationTransport;

/// First reconnect delay of the listener.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Reconnect delays double up to this ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(300); // 5 minutes max

/// Receives every decoded invalidation, self-originated ones included.
#[async_trait]
pub trait InvalidationHandler: Send + Sync + 'static {
    async fn on_invalidation(&self, message: &InvalidationMessage);
}

/// Publisher settings.
#[derive(Debug, Clone)]
pub struct BusSettings {
    pub channel: String,
    /// Upper bound for one transport send.
    pub send_timeout: Duration,
    /// Messages buffered before `publish` starts dropping.
    pub queue_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            channel: "cache-invalidation".to_string(),
            send_timeout: Duration::from_secs(2),
            queue_capacity: 1024,
        }
    }
}

enum Command {
    Publish(InvalidationMessage),
    Flush(oneshot::Sender<()>),
}

/// Handle used to enqueue invalidations. Cheap to clone.
#[derive(Clone)]
pub struct InvalidationPublisher {
    queue: mpsc::Sender<Command>,
}

impl InvalidationPublisher {
    /// Enqueue `{cache_name, key}` for broadcast.
    ///
    /// Never blocks and never fails: a full or closed queue is logged and
    /// the message is dropped.
    pub fn publish(&self, cache_name: &str, key: &str) {
        let message = InvalidationMessage::new(cache_name, key);
        match self.queue.try_send(Command::Publish(message)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(cache = cache_name, key, "invalidation queue full, dropping");
                crate::metrics::record_invalidation_dropped("queue_full");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(cache = cache_name, key, "invalidation publisher shut down, dropping");
                crate::metrics::record_invalidation_dropped("closed");
            }
        }
    }

    /// Wait until every message enqueued before this call has been handed
    /// to the transport (or dropped).
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.queue.send(Command::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }

    /// Drain the queue and release this handle.
    ///
    /// The worker exits once every clone of the publisher is gone.
    pub async fn shutdown(self) {
        self.flush().await;
    }
}

/// Entry points of the invalidation bus.
pub struct InvalidationBus;

impl InvalidationBus {
    /// Spawn the publish worker and return its handle.
    pub fn start(
        transport: Arc<dyn InvalidationTransport>,
        settings: BusSettings,
    ) -> InvalidationPublisher {
        let (queue, mut commands) = mpsc::channel(settings.queue_capacity.max(1));

        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                match command {
                    Command::Publish(message) => {
                        send_one(transport.as_ref(), &settings, &message).await;
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("invalidation publisher stopped");
        });

        InvalidationPublisher { queue }
    }

    /// Subscribe `handler` to `channel`.
    ///
    /// The first subscription attempt completes before this returns, so
    /// messages sent afterwards are seen. The listener then runs in the
    /// background and reconnects with exponential backoff whenever the
    /// subscription fails or its stream ends.
    pub async fn subscribe(
        transport: Arc<dyn InvalidationTransport>,
        channel: String,
        handler: Arc<dyn InvalidationHandler>,
    ) -> JoinHandle<()> {
        let mut attempt = Some(transport.subscribe(&channel).await);

        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;

            loop {
                let subscribed = match attempt.take() {
                    Some(result) => result,
                    None => transport.subscribe(&channel).await,
                };

                match subscribed {
                    Ok(mut payloads) => {
                        tracing::info!(
                            transport = transport.name(),
                            channel = %channel,
                            "Subscribed to invalidation channel"
                        );
                        backoff = INITIAL_BACKOFF;
                        while let Some(payload) = payloads.next().await {
                            dispatch(&payload, handler.as_ref()).await;
                        }
                        tracing::warn!(
                            channel = %channel,
                            backoff_secs = backoff.as_secs(),
                            "Invalidation subscription closed, reconnecting..."
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            channel = %channel,
                            backoff_secs = backoff.as_secs(),
                            "Invalidation listener error, reconnecting..."
                        );
                    }
                }

                tokio::time::sleep(backoff).await;
                // Exponential backoff with max limit
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        })
    }
}

/// Decode one payload and hand it to `handler`.
///
/// Returns `false` when the payload was malformed and dropped.
pub async fn dispatch(payload: &str, handler: &dyn InvalidationHandler) -> bool {
    match InvalidationMessage::decode(payload) {
        Ok(message) => {
            tracing::debug!(
                cache = %message.cache_name,
                key = %message.key,
                "received cache invalidation"
            );
            crate::metrics::record_invalidation_received(&message.cache_name);
            handler.on_invalidation(&message).await;
            true
        }
        Err(e) => {
            tracing::warn!(error = %e, payload, "dropping malformed invalidation");
            crate::metrics::record_invalidation_dropped("malformed");
            false
        }
    }
}

async fn send_one(
    transport: &dyn InvalidationTransport,
    settings: &BusSettings,
    message: &InvalidationMessage,
) {
    let payload = match message.encode() {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, cache = %message.cache_name, key = %message.key, "dropping invalidation");
            crate::metrics::record_invalidation_dropped("encode");
            return;
        }
    };

    match tokio::time::timeout(settings.send_timeout, transport.send(&settings.channel, payload)).await {
        Ok(Ok(())) => {
            tracing::debug!(cache = %message.cache_name, key = %message.key, "published cache invalidation");
            crate::metrics::record_invalidation_published(&message.cache_name);
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, cache = %message.cache_name, key = %message.key, "failed to publish invalidation");
            crate::metrics::record_invalidation_dropped("send");
        }
        Err(_) => {
            tracing::warn!(
                cache = %message.cache_name,
                key = %message.key,
                timeout_ms = settings.send_timeout.as_millis() as u64,
                "invalidation publish timed out"
            );
            crate::metrics::record_invalidation_dropped("timeout");
        }
    }
}
