//! Wiring of one cache node: backend, invalidation bus, coordinator and the
//! inventory services on top of it.

use std::sync::Arc;
use std::time::Duration;

use invcache_core::NamespaceContext;
use invcache_storage::{DynStore, InMemoryStore};
use tokio::task::JoinHandle;

use crate::cache::{
    BusSettings, CacheBackend, CacheCoordinator, CacheTtls, InvalidationBus, InvalidationPublisher,
    InvalidationTransport,
};
use crate::config::AppConfig;
use crate::model::{Category, Product, Supplier};
use crate::services::{CategoryService, ProductService, SupplierService};

/// Backing stores, the source of truth shared by every node.
#[derive(Clone)]
pub struct Stores {
    pub products: DynStore<Product>,
    pub categories: DynStore<Category>,
    pub suppliers: DynStore<Supplier>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            products: Arc::new(InMemoryStore::new()),
            categories: Arc::new(InMemoryStore::new()),
            suppliers: Arc::new(InMemoryStore::new()),
        }
    }
}

pub struct ServerBuilder {
    config: AppConfig,
    backend: Option<CacheBackend>,
    transport: Option<Arc<dyn InvalidationTransport>>,
    stores: Option<Stores>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            backend: None,
            transport: None,
            stores: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Use `backend` instead of creating one from the Redis settings.
    pub fn with_backend(mut self, backend: CacheBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use `transport` for invalidations. Nodes built with clones of one
    /// [`LocalTransport`](crate::cache::LocalTransport) see each other's
    /// messages.
    pub fn with_transport(mut self, transport: Arc<dyn InvalidationTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub async fn build(self) -> anyhow::Result<CacheServer> {
        let config = self.config;
        config.validate().map_err(anyhow::Error::msg)?;

        let namespaces = NamespaceContext::new(&config.namespace.base)?;

        let backend = match self.backend {
            Some(backend) => backend,
            None => crate::create_cache_backend(&config.redis).await,
        };
        let transport = self
            .transport
            .unwrap_or_else(|| crate::create_transport(&backend, &config.redis));

        let publisher = InvalidationBus::start(
            transport.clone(),
            BusSettings {
                channel: config.redis.channel.clone(),
                send_timeout: config.redis.timeout(),
                ..BusSettings::default()
            },
        );

        let coordinator = Arc::new(
            CacheCoordinator::new(backend, CacheTtls::from(&config.cache))
                .with_publisher(publisher.clone()),
        );

        let listener = InvalidationBus::subscribe(
            transport.clone(),
            config.redis.channel.clone(),
            coordinator.clone(),
        )
        .await;
        let cleanup = coordinator
            .clone()
            .start_cleanup_task(config.cache.cleanup_interval());

        let stores = self.stores.unwrap_or_else(Stores::in_memory);

        tracing::info!(
            namespace = %namespaces.base(),
            transport = transport.name(),
            redis = coordinator.backend().redis_pool().is_some(),
            channel = %config.redis.channel,
            "cache node started"
        );

        Ok(CacheServer {
            products: ProductService::new(
                coordinator.clone(),
                stores.products,
                namespaces.clone(),
            ),
            categories: CategoryService::new(
                coordinator.clone(),
                stores.categories,
                namespaces.clone(),
            ),
            suppliers: SupplierService::new(
                coordinator.clone(),
                stores.suppliers,
                namespaces.clone(),
            ),
            coordinator,
            namespaces,
            publisher,
            tasks: vec![listener, cleanup],
        })
    }
}

/// A running cache node.
pub struct CacheServer {
    coordinator: Arc<CacheCoordinator>,
    namespaces: NamespaceContext,
    publisher: InvalidationPublisher,
    products: ProductService,
    categories: CategoryService,
    suppliers: SupplierService,
    tasks: Vec<JoinHandle<()>>,
}

impl CacheServer {
    pub fn coordinator(&self) -> &Arc<CacheCoordinator> {
        &self.coordinator
    }

    pub fn namespaces(&self) -> &NamespaceContext {
        &self.namespaces
    }

    pub fn publisher(&self) -> &InvalidationPublisher {
        &self.publisher
    }

    pub fn products(&self) -> &ProductService {
        &self.products
    }

    pub fn categories(&self) -> &CategoryService {
        &self.categories
    }

    pub fn suppliers(&self) -> &SupplierService {
        &self.suppliers
    }

    /// Serve until Ctrl+C, then shut down.
    pub async fn run(self) -> anyhow::Result<()> {
        shutdown_signal().await;
        self.shutdown().await;
        Ok(())
    }

    /// Stop the listener and the sweep, then drain pending invalidations.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        let drain = self.publisher.shutdown();
        if tokio::time::timeout(Duration::from_secs(5), drain).await.is_err() {
            tracing::warn!("timed out draining invalidation queue");
        }
        tracing::info!("cache node stopped");
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LocalTransport;

    #[tokio::test]
    async fn test_build_with_defaults() {
        let server = ServerBuilder::new().build().await.unwrap();
        assert_eq!(server.namespaces().base().to_string(), "inventory");
        assert!(!server.coordinator().backend().is_redis_available().await);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.namespace.base = " ".into();
        let built = ServerBuilder::new()
            .with_config(config)
            .with_transport(Arc::new(LocalTransport::default()))
            .build()
            .await;
        assert!(built.is_err());
    }
}
