use std::sync::Arc;

use invcache_core::NamespaceContext;
use invcache_storage::{DynStore, Lookup, StorageResult};

use super::CachedRepository;
use crate::cache::{CacheCoordinator, CacheKey};
use crate::model::Category;

pub struct CategoryService {
    repo: CachedRepository<Category>,
}

impl CategoryService {
    pub fn new(
        cache: Arc<CacheCoordinator>,
        store: DynStore<Category>,
        namespaces: NamespaceContext,
    ) -> Self {
        Self {
            repo: CachedRepository::new(cache, store, namespaces),
        }
    }

    pub async fn find_by_id(&self, id: i64) -> StorageResult<Option<Category>> {
        self.repo.find_by_id(id).await
    }

    pub async fn find_by_name(&self, name: &str) -> StorageResult<Option<Category>> {
        self.repo
            .find_one(CacheKey::Name(name.to_string()), Lookup::field("name", name))
            .await
    }

    pub async fn find_all(&self) -> StorageResult<Vec<Category>> {
        self.repo.find_all().await
    }

    pub async fn save(&self, category: Category) -> StorageResult<Category> {
        self.repo.save(category).await
    }

    pub async fn delete(&self, id: i64) -> StorageResult<bool> {
        self.repo.delete(id).await
    }
}
