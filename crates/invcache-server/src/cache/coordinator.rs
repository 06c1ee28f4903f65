//! Cache-aside coordination on top of [`CacheBackend`].
//!
//! Values are stored as MessagePack. Every operation is scoped to an explicit
//! [`Namespace`]; the same `(cache, key)` in two namespaces are unrelated
//! entries.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use invcache_core::Namespace;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::backend::{CacheBackend, CacheStats, EntryKey};
use super::keys::CacheKey;
use super::message::InvalidationMessage;
use super::pubsub::{InvalidationHandler, InvalidationPublisher};
use crate::config::CacheConfig;

/// Per-cache time to live with a default fallback.
///
/// A zero duration means entries of that cache never expire.
#[derive(Debug, Clone)]
pub struct CacheTtls {
    default: Duration,
    per_cache: HashMap<String, Duration>,
}

impl CacheTtls {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            per_cache: HashMap::new(),
        }
    }

    pub fn with(mut self, cache_name: impl Into<String>, ttl: Duration) -> Self {
        self.per_cache.insert(cache_name.into(), ttl);
        self
    }

    pub fn ttl_for(&self, cache_name: &str) -> Duration {
        self.per_cache
            .get(cache_name)
            .copied()
            .unwrap_or(self.default)
    }
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        config
            .ttl_secs
            .iter()
            .fold(Self::new(config.default_ttl()), |ttls, (name, secs)| {
                ttls.with(name.clone(), Duration::from_secs(*secs))
            })
    }
}

/// Read-through cache with write-time invalidation.
pub struct CacheCoordinator {
    backend: CacheBackend,
    ttls: CacheTtls,
    publisher: Option<InvalidationPublisher>,
}

impl CacheCoordinator {
    /// A coordinator that only evicts locally. Use
    /// [`with_publisher`](Self::with_publisher) to broadcast invalidations.
    pub fn new(backend: CacheBackend, ttls: CacheTtls) -> Self {
        Self {
            backend,
            ttls,
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: InvalidationPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn backend(&self) -> &CacheBackend {
        &self.backend
    }

    pub fn ttl_for(&self, cache_name: &str) -> Duration {
        self.ttls.ttl_for(cache_name)
    }

    pub fn stats(&self) -> CacheStats {
        self.backend.stats()
    }

    /// Live value of `key`, if cached. Never loads.
    ///
    /// An entry that no longer decodes as `T` is evicted and reported as a
    /// miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &Namespace,
        cache_name: &str,
        key: impl fmt::Display,
    ) -> Option<T> {
        let entry = EntryKey::new(namespace, cache_name, key);
        let data = self.backend.get(&entry).await?;
        match rmp_serde::from_slice::<T>(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %entry, error = %e, "Failed to deserialize cached value");
                self.backend.evict(&entry).await;
                None
            }
        }
    }

    /// Cached value of `key`, or the result of `loader` which is then cached
    /// with the cache's TTL.
    ///
    /// Concurrent misses on one key may each run `loader`; the last write
    /// wins. Loader errors are returned and nothing is cached.
    pub async fn get_or_load<T, E, F, Fut>(
        &self,
        namespace: &Namespace,
        cache_name: &str,
        key: impl fmt::Display,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = key.to_string();
        if let Some(value) = self.get(namespace, cache_name, &key).await {
            return Ok(value);
        }
        let value = loader().await?;
        self.put(namespace, cache_name, &key, &value).await;
        Ok(value)
    }

    /// Like [`get_or_load`](Self::get_or_load), but a `None` result is
    /// returned without being cached.
    pub async fn get_or_load_optional<T, E, F, Fut>(
        &self,
        namespace: &Namespace,
        cache_name: &str,
        key: impl fmt::Display,
        loader: F,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let key = key.to_string();
        if let Some(value) = self.get(namespace, cache_name, &key).await {
            return Ok(Some(value));
        }
        let loaded = loader().await?;
        if let Some(value) = &loaded {
            self.put(namespace, cache_name, &key, value).await;
        }
        Ok(loaded)
    }

    /// Store `value` with the cache's configured TTL.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        namespace: &Namespace,
        cache_name: &str,
        key: impl fmt::Display,
        value: &T,
    ) {
        self.put_with_ttl(namespace, cache_name, key, value, self.ttl_for(cache_name))
            .await;
    }

    /// Store `value` with an explicit TTL, overwriting any existing entry.
    pub async fn put_with_ttl<T: Serialize + ?Sized>(
        &self,
        namespace: &Namespace,
        cache_name: &str,
        key: impl fmt::Display,
        value: &T,
        ttl: Duration,
    ) {
        let entry = EntryKey::new(namespace, cache_name, key);
        match rmp_serde::to_vec(value) {
            Ok(data) => self.backend.set(&entry, data, ttl).await,
            Err(e) => {
                tracing::warn!(key = %entry, error = %e, "Failed to serialize value for cache");
            }
        }
    }

    /// Remove one entry of this instance's cache. No-op if absent.
    pub async fn evict(&self, namespace: &Namespace, cache_name: &str, key: impl fmt::Display) {
        self.backend
            .evict(&EntryKey::new(namespace, cache_name, key))
            .await;
    }

    /// Remove every entry of `cache_name` in `namespace`.
    pub async fn clear(&self, namespace: &Namespace, cache_name: &str) {
        self.backend.clear_cache(namespace, cache_name).await;
        tracing::info!(namespace = %namespace, cache = cache_name, "cache cleared");
    }

    /// Remove every entry in `namespace`.
    pub async fn clear_namespace(&self, namespace: &Namespace) {
        self.backend.clear_namespace(namespace).await;
        tracing::info!(namespace = %namespace, "namespace cleared");
    }

    /// Start collecting the keys a write will invalidate.
    ///
    /// Call [`PendingInvalidations::commit`] once the backing store has
    /// accepted the write. Dropping the batch instead discards it.
    pub fn begin_invalidation(&self, namespace: &Namespace) -> PendingInvalidations<'_> {
        PendingInvalidations {
            coordinator: self,
            namespace: namespace.clone(),
            keys: Vec::new(),
        }
    }

    /// Spawn the periodic sweep of expired L1 entries.
    pub fn start_cleanup_task(
        self: std::sync::Arc<Self>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = self.backend.purge_expired();
                let stats = self.backend.stats();
                crate::metrics::set_cache_entries("L1", stats.l1_entries);
                if removed > 0 {
                    tracing::debug!(removed, remaining = stats.l1_entries, "expired cache entries purged");
                }
            }
        })
    }
}

#[async_trait]
impl InvalidationHandler for CacheCoordinator {
    async fn on_invalidation(&self, message: &InvalidationMessage) {
        let removed = self
            .backend
            .evict_everywhere(&message.cache_name, &message.key);
        tracing::trace!(
            cache = %message.cache_name,
            key = %message.key,
            removed,
            "applied remote invalidation"
        );
    }
}

/// Keys to invalidate once a write has committed.
///
/// Collected while the write is prepared, applied by [`commit`](Self::commit)
/// only after the store call returned successfully. An error path that
/// returns early drops the batch, and nothing is evicted or published.
#[must_use = "invalidations are only applied by commit()"]
pub struct PendingInvalidations<'a> {
    coordinator: &'a CacheCoordinator,
    namespace: Namespace,
    keys: Vec<(String, String)>,
}

impl PendingInvalidations<'_> {
    /// Add one key. Duplicates are ignored.
    pub fn add(&mut self, cache_name: &str, key: &CacheKey) -> &mut Self {
        let pair = (cache_name.to_string(), key.to_string());
        if !self.keys.contains(&pair) {
            self.keys.push(pair);
        }
        self
    }

    pub fn extend<'k>(
        &mut self,
        cache_name: &str,
        keys: impl IntoIterator<Item = &'k CacheKey>,
    ) -> &mut Self {
        for key in keys {
            self.add(cache_name, key);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Evict every collected key locally, then publish each one.
    ///
    /// Local eviction is best effort and a publish failure is never
    /// surfaced, so this cannot fail.
    pub async fn commit(mut self) {
        let keys = std::mem::take(&mut self.keys);
        let coordinator = self.coordinator;

        for (cache_name, key) in &keys {
            coordinator
                .backend
                .evict(&EntryKey::new(&self.namespace, cache_name, key))
                .await;
        }

        if let Some(publisher) = &coordinator.publisher {
            for (cache_name, key) in &keys {
                publisher.publish(cache_name, key);
            }
        }

        tracing::debug!(
            namespace = %self.namespace,
            keys = keys.len(),
            "write committed, cache invalidated"
        );
    }
}

impl Drop for PendingInvalidations<'_> {
    fn drop(&mut self) {
        if !self.keys.is_empty() {
            tracing::debug!(
                namespace = %self.namespace,
                keys = self.keys.len(),
                "write not committed, invalidations discarded"
            );
        }
    }
}
