//! Cache-aside services for the inventory entities.
//!
//! Reads go through the [`CacheCoordinator`] and fall back to the backing
//! store on a miss. Writes go to the store first; once it has accepted the
//! write, every key derived from the entity's previous and new state is
//! evicted locally and broadcast to sibling instances.
//!
//! Writes do not repopulate the cache. This instance also receives its own
//! broadcast and would evict a freshly written entry again, so the next read
//! loads it instead.

mod category;
mod product;
mod supplier;

pub use category::CategoryService;
pub use product::ProductService;
pub use supplier::SupplierService;

use std::sync::Arc;

use invcache_core::{Namespace, NamespaceContext};
use invcache_storage::{DynStore, Entity, Lookup, StorageResult};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::{CacheCoordinator, CacheKey, Cacheable};

/// Shared read and write paths of one cached entity type.
struct CachedRepository<E> {
    cache: Arc<CacheCoordinator>,
    store: DynStore<E>,
    namespaces: NamespaceContext,
}

impl<E> CachedRepository<E>
where
    E: Entity + Cacheable + Serialize + DeserializeOwned,
{
    fn new(cache: Arc<CacheCoordinator>, store: DynStore<E>, namespaces: NamespaceContext) -> Self {
        Self {
            cache,
            store,
            namespaces,
        }
    }

    fn namespace(&self) -> Namespace {
        self.namespaces.current()
    }

    async fn find_by_id(&self, id: i64) -> StorageResult<Option<E>> {
        let store = &self.store;
        self.cache
            .get_or_load_optional(&self.namespace(), E::CACHE_NAME, CacheKey::Id(id), || {
                store.load(id)
            })
            .await
    }

    /// First entity matching a unique lookup. Absence is not cached.
    async fn find_one(&self, key: CacheKey, lookup: Lookup) -> StorageResult<Option<E>> {
        let store = &self.store;
        self.cache
            .get_or_load_optional(&self.namespace(), E::CACHE_NAME, key, || async move {
                Ok(store.load_by(&lookup).await?.into_iter().next())
            })
            .await
    }

    /// Every entity matching `lookup`. An empty listing is cached like any other.
    async fn find_many(&self, key: CacheKey, lookup: Lookup) -> StorageResult<Vec<E>> {
        let store = &self.store;
        self.cache
            .get_or_load(&self.namespace(), E::CACHE_NAME, key, || async move {
                store.load_by(&lookup).await
            })
            .await
    }

    async fn find_all(&self) -> StorageResult<Vec<E>> {
        self.find_many(CacheKey::All, Lookup::All).await
    }

    async fn save(&self, entity: E) -> StorageResult<E> {
        let previous = match entity.id() {
            Some(id) => self.store.load(id).await?,
            None => None,
        };

        let namespace = self.namespace();
        let mut pending = self.cache.begin_invalidation(&namespace);
        if let Some(previous) = &previous {
            pending.extend(E::CACHE_NAME, &previous.cache_keys());
        }

        let saved = self.store.save(entity).await?;

        pending.extend(E::CACHE_NAME, &saved.cache_keys());
        pending.commit().await;

        tracing::debug!(
            entity = E::descriptor().name,
            id = saved.id(),
            namespace = %namespace,
            "entity saved"
        );
        Ok(saved)
    }

    async fn delete(&self, id: i64) -> StorageResult<bool> {
        let previous = self.store.load(id).await?;

        let namespace = self.namespace();
        let mut pending = self.cache.begin_invalidation(&namespace);
        match &previous {
            Some(previous) => pending.extend(E::CACHE_NAME, &previous.cache_keys()),
            None => pending.add(E::CACHE_NAME, &CacheKey::Id(id)),
        };

        if !self.store.delete_by_id(id).await? {
            return Ok(false);
        }
        pending.commit().await;

        tracing::debug!(entity = E::descriptor().name, id, namespace = %namespace, "entity deleted");
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::time::Duration;

    use super::*;
    use crate::cache::{CacheBackend, CacheTtls};

    pub(crate) fn coordinator() -> Arc<CacheCoordinator> {
        Arc::new(CacheCoordinator::new(
            CacheBackend::new_local(),
            CacheTtls::new(Duration::from_secs(60)),
        ))
    }

    pub(crate) fn namespaces() -> NamespaceContext {
        NamespaceContext::new("inventory").unwrap()
    }
}
