use std::sync::Arc;

use invcache_core::NamespaceContext;
use invcache_storage::{DynStore, Lookup, StorageResult};

use super::CachedRepository;
use crate::cache::{CacheCoordinator, CacheKey};
use crate::model::Supplier;

pub struct SupplierService {
    repo: CachedRepository<Supplier>,
}

impl SupplierService {
    pub fn new(
        cache: Arc<CacheCoordinator>,
        store: DynStore<Supplier>,
        namespaces: NamespaceContext,
    ) -> Self {
        Self {
            repo: CachedRepository::new(cache, store, namespaces),
        }
    }

    pub async fn find_by_id(&self, id: i64) -> StorageResult<Option<Supplier>> {
        self.repo.find_by_id(id).await
    }

    pub async fn find_by_name(&self, name: &str) -> StorageResult<Option<Supplier>> {
        self.repo
            .find_one(CacheKey::Name(name.to_string()), Lookup::field("name", name))
            .await
    }

    pub async fn find_by_email(&self, email: &str) -> StorageResult<Option<Supplier>> {
        self.repo
            .find_one(CacheKey::Email(email.to_string()), Lookup::field("email", email))
            .await
    }

    pub async fn find_all(&self) -> StorageResult<Vec<Supplier>> {
        self.repo.find_all().await
    }

    pub async fn save(&self, supplier: Supplier) -> StorageResult<Supplier> {
        self.repo.save(supplier).await
    }

    pub async fn delete(&self, id: i64) -> StorageResult<bool> {
        self.repo.delete(id).await
    }
}
