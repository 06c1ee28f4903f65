//! Cache backend implementation with L1 (DashMap) and L2 (Redis) tiers.

use dashmap::DashMap;
use deadpool_redis::Pool;
use invcache_core::Namespace;
use redis::AsyncCommands;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Number of keys requested per `SCAN` round trip.
const SCAN_BATCH: usize = 200;

/// Address of a cache entry: namespace, cache name and key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub namespace: String,
    pub cache_name: String,
    pub key: String,
}

impl EntryKey {
    pub fn new(namespace: &Namespace, cache_name: &str, key: impl fmt::Display) -> Self {
        Self {
            namespace: namespace.to_string(),
            cache_name: cache_name.to_string(),
            key: key.to_string(),
        }
    }

    /// Key used in the shared tier: `{namespace}:cache_name:key`.
    ///
    /// The namespace is wrapped in a hash tag, so a `{namespace}:*` pattern
    /// matches that namespace only and never a tenant nested under it.
    pub fn redis_key(&self) -> String {
        format!("{}:{}:{}", namespace_tag(&self.namespace), self.cache_name, self.key)
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.cache_name, self.key)
    }
}

/// A cached entry with TTL support.
///
/// The data is wrapped in `Arc` so hits hand out the bytes without copying.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    /// Time to live. Zero means the entry never expires.
    pub ttl: Duration,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        !self.ttl.is_zero() && self.cached_at.elapsed() > self.ttl
    }
}

type LocalTier = Arc<DashMap<EntryKey, CachedEntry>>;

/// Two-tier cache backend: L1 (DashMap) + L2 (Redis).
///
/// ## Cache Modes
///
/// - **Local**: Single-instance mode using only DashMap
/// - **Redis**: Multi-instance mode with DashMap (L1) + Redis (L2)
///
/// Redis failures never reach the caller: they are logged and the operation
/// degrades to a miss (reads) or to L1 only (writes).
#[derive(Clone)]
pub enum CacheBackend {
    /// Single-instance: local DashMap only
    Local(LocalTier),

    /// Multi-instance: Redis + local L1
    Redis {
        redis: Pool,
        local: LocalTier,
        /// Upper bound for every Redis round trip.
        timeout: Duration,
    },
}

impl CacheBackend {
    /// Create a new local-only cache backend.
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    /// Create a new Redis-backed cache backend.
    pub fn new_redis(redis_pool: Pool, timeout: Duration) -> Self {
        CacheBackend::Redis {
            redis: redis_pool,
            local: Arc::new(DashMap::new()),
            timeout,
        }
    }

    fn local(&self) -> &LocalTier {
        match self {
            CacheBackend::Local(map) => map,
            CacheBackend::Redis { local, .. } => local,
        }
    }

    /// Get a live value from the cache.
    ///
    /// ## Lookup Order
    ///
    /// 1. Check L1 (DashMap)
    /// 2. Check L2 (Redis)
    /// 3. Return None if not found
    ///
    /// If found in L2, the value is promoted to L1 with the remaining L2 TTL.
    pub async fn get(&self, key: &EntryKey) -> Option<Arc<Vec<u8>>> {
        let local = self.local();
        if let Some(entry) = local.get(key) {
            if !entry.is_expired() {
                tracing::trace!(key = %key, "cache hit (L1)");
                crate::metrics::record_cache_hit("L1");
                return Some(Arc::clone(&entry.data));
            }
            // Remove expired entry
            drop(entry);
            local.remove_if(key, |_, entry| entry.is_expired());
        }

        let CacheBackend::Redis { redis, timeout, .. } = self else {
            crate::metrics::record_cache_miss();
            return None;
        };

        let redis_key = key.redis_key();
        let fetched = bounded(*timeout, async {
            let mut conn = redis.get().await.map_err(|e| e.to_string())?;
            let (data, pttl): (Option<Vec<u8>>, i64) = redis::pipe()
                .get(&redis_key)
                .pttl(&redis_key)
                .query_async(&mut conn)
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>(data.map(|data| (data, pttl)))
        })
        .await;

        match fetched {
            Ok(Some((data, pttl))) => {
                tracing::debug!(key = %key, "cache hit (L2)");
                crate::metrics::record_cache_hit("L2");

                // PTTL is -1 for keys without expiry
                let ttl = match pttl {
                    -1 => Duration::ZERO,
                    ms if ms > 0 => Duration::from_millis(ms.unsigned_abs()),
                    _ => Duration::from_millis(1),
                };
                let entry = CachedEntry::new(data, ttl);
                let data_arc = Arc::clone(&entry.data);
                local.insert(key.clone(), entry);
                Some(data_arc)
            }
            Ok(None) => {
                tracing::trace!(key = %key, "cache miss");
                crate::metrics::record_cache_miss();
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Redis GET failed, treating as miss");
                crate::metrics::record_cache_miss();
                None
            }
        }
    }

    /// Set a value in the cache with TTL.
    ///
    /// ## Write Strategy
    ///
    /// - **Local mode**: Write to DashMap only
    /// - **Redis mode**: Write to both L1 (DashMap) and L2 (Redis)
    ///
    /// A zero `ttl` stores the value without expiry.
    pub async fn set(&self, key: &EntryKey, value: Vec<u8>, ttl: Duration) {
        let entry = CachedEntry::new(value, ttl);
        let data = Arc::clone(&entry.data);
        self.local().insert(key.clone(), entry);

        let CacheBackend::Redis { redis, timeout, .. } = self else {
            return;
        };

        let redis_key = key.redis_key();
        let ttl_secs = ttl.as_secs();
        let written = bounded(*timeout, async {
            let mut conn = redis.get().await.map_err(|e| e.to_string())?;
            let result = if ttl.is_zero() {
                conn.set::<_, _, ()>(&redis_key, &*data).await
            } else {
                // Sub-second TTLs round up so Redis does not reject EX 0
                conn.set_ex::<_, _, ()>(&redis_key, &*data, ttl_secs.max(1))
                    .await
            };
            result.map_err(|e| e.to_string())
        })
        .await;

        match written {
            Ok(()) => tracing::trace!(key = %key, ttl_secs, "cache set (L1+L2)"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Redis SET failed, kept in L1 only"),
        }
    }

    /// Remove one entry from both tiers.
    ///
    /// Returns once the shared tier has acknowledged the delete (or the
    /// attempt failed), so an invalidation published afterwards can never be
    /// answered from a stale L2 copy.
    pub async fn evict(&self, key: &EntryKey) {
        self.local().remove(key);

        let CacheBackend::Redis { redis, timeout, .. } = self else {
            tracing::trace!(key = %key, "cache evicted (local)");
            return;
        };

        let redis_key = key.redis_key();
        let deleted = bounded(*timeout, async {
            let mut conn = redis.get().await.map_err(|e| e.to_string())?;
            conn.del::<_, ()>(&redis_key)
                .await
                .map_err(|e| e.to_string())
        })
        .await;

        match deleted {
            Ok(()) => tracing::trace!(key = %key, "cache evicted (L1+L2)"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Redis DEL failed"),
        }
    }

    /// Remove every entry of one cache within one namespace.
    pub async fn clear_cache(&self, namespace: &Namespace, cache_name: &str) {
        let namespace = namespace.to_string();
        self.local()
            .retain(|key, _| !(key.namespace == namespace && key.cache_name == cache_name));
        self.delete_matching(format!("{}:{cache_name}:*", namespace_tag(&namespace)))
            .await;
    }

    /// Remove every entry of every cache within one namespace.
    ///
    /// Clearing a base namespace leaves its tenants' entries in place, in
    /// both tiers.
    pub async fn clear_namespace(&self, namespace: &Namespace) {
        let namespace = namespace.to_string();
        self.local().retain(|key, _| key.namespace != namespace);
        self.delete_matching(format!("{}:*", namespace_tag(&namespace)))
            .await;
    }

    /// Remove `key` of `cache_name` from L1 in every namespace.
    ///
    /// Used when a sibling instance announces an invalidation. L2 is shared,
    /// and the announcing instance already deleted its copy there.
    pub fn evict_everywhere(&self, cache_name: &str, key: &str) -> usize {
        let mut removed = 0;
        self.local().retain(|entry, _| {
            let matches = entry.cache_name == cache_name && entry.key == key;
            if matches {
                removed += 1;
            }
            !matches
        });
        removed
    }

    /// Drop expired L1 entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut removed = 0;
        self.local().retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    async fn delete_matching(&self, pattern: String) {
        let CacheBackend::Redis { redis, timeout, .. } = self else {
            return;
        };

        let deleted = bounded(*timeout, async {
            let mut conn = redis.get().await.map_err(|e| e.to_string())?;
            let mut cursor: u64 = 0;
            let mut deleted = 0usize;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| e.to_string())?;
                if !keys.is_empty() {
                    deleted += keys.len();
                    conn.del::<_, ()>(keys).await.map_err(|e| e.to_string())?;
                }
                if next == 0 {
                    return Ok::<_, String>(deleted);
                }
                cursor = next;
            }
        })
        .await;

        match deleted {
            Ok(count) => tracing::debug!(pattern = %pattern, count, "cleared L2 entries"),
            Err(e) => tracing::warn!(pattern = %pattern, error = %e, "Redis clear failed"),
        }
    }

    /// Get cache statistics (L1 only).
    pub fn stats(&self) -> CacheStats {
        match self {
            CacheBackend::Local(map) => CacheStats {
                l1_entries: map.len(),
                mode: "local".to_string(),
            },
            CacheBackend::Redis { local, .. } => CacheStats {
                l1_entries: local.len(),
                mode: "redis".to_string(),
            },
        }
    }

    /// Check if Redis is available (for health checks).
    pub async fn is_redis_available(&self) -> bool {
        match self {
            CacheBackend::Local(_) => false,
            CacheBackend::Redis { redis, timeout, .. } => {
                bounded(*timeout, async { redis.get().await.map_err(|e| e.to_string()) })
                    .await
                    .is_ok()
            }
        }
    }

    /// The Redis pool, when running in multi-instance mode.
    pub fn redis_pool(&self) -> Option<&Pool> {
        match self {
            CacheBackend::Local(_) => None,
            CacheBackend::Redis { redis, .. } => Some(redis),
        }
    }
}

/// Hash-tagged namespace prefix. Namespace segments cannot contain glob or
/// brace characters, so the result is safe inside a `SCAN MATCH` pattern.
fn namespace_tag(namespace: &str) -> String {
    format!("{{{namespace}}}")
}

/// Run a Redis round trip with an upper time bound.
async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, String>>,
) -> Result<T, String> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| format!("timed out after {}ms", timeout.as_millis()))?
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub l1_entries: usize,
    pub mode: String,
}
