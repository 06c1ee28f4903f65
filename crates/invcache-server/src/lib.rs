pub mod cache;
pub mod config;
pub mod metrics;
pub mod model;
pub mod observability;
pub mod server;
pub mod services;

use std::sync::Arc;

pub use cache::{
    CacheBackend, CacheCoordinator, CacheKey, CacheTtls, InvalidationBus, InvalidationPublisher,
    InvalidationTransport, LocalTransport, RedisTransport,
};
pub use config::{AppConfig, CacheConfig, RedisConfig};
pub use observability::init_tracing;
pub use server::{CacheServer, ServerBuilder, Stores};
pub use services::{CategoryService, ProductService, SupplierService};

/// Create a cache backend based on configuration.
///
/// ## Cache Modes
///
/// - **Redis disabled**: Returns local-only cache (DashMap)
/// - **Redis enabled**: Attempts to connect to Redis, falls back to local on failure
///
/// ## Graceful Degradation
///
/// If Redis connection fails, the system automatically falls back to local-only mode.
/// This allows the service to start and run even if Redis is unavailable.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::new_local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(config.timeout());
    pool_config.timeouts.create = Some(config.timeout());
    pool_config.timeouts.recycle = Some(config.timeout());
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return CacheBackend::new_local();
        }
    };

    // Test connection
    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis successfully");
            CacheBackend::new_redis(pool, config.timeout())
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            CacheBackend::new_local()
        }
    }
}

/// Pick the invalidation transport matching `backend`.
///
/// A Redis backend broadcasts over Redis pub/sub. A local backend gets an
/// in-process channel, which only reaches coordinators in this process.
pub fn create_transport(backend: &CacheBackend, config: &RedisConfig) -> Arc<dyn InvalidationTransport> {
    match backend.redis_pool() {
        Some(pool) => Arc::new(RedisTransport::new(pool.clone(), config.url.clone())),
        None => Arc::new(LocalTransport::default()),
    }
}
