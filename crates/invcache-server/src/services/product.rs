use std::sync::Arc;

use invcache_core::NamespaceContext;
use invcache_storage::{
    DynStore, Lookup, PersistOutcome, StorageError, StorageResult, Tracked, persist_changes,
};

use super::CachedRepository;
use crate::cache::{CacheCoordinator, CacheKey, Cacheable};
use crate::model::Product;

/// Products, cached by id, SKU, category, supplier and as a full listing.
pub struct ProductService {
    repo: CachedRepository<Product>,
}

impl ProductService {
    pub fn new(
        cache: Arc<CacheCoordinator>,
        store: DynStore<Product>,
        namespaces: NamespaceContext,
    ) -> Self {
        Self {
            repo: CachedRepository::new(cache, store, namespaces),
        }
    }

    pub async fn find_by_id(&self, id: i64) -> StorageResult<Option<Product>> {
        self.repo.find_by_id(id).await
    }

    pub async fn find_by_sku(&self, sku: &str) -> StorageResult<Option<Product>> {
        self.repo
            .find_one(CacheKey::Sku(sku.to_string()), Lookup::field("sku", sku))
            .await
    }

    pub async fn find_by_category(&self, category_id: i64) -> StorageResult<Vec<Product>> {
        self.repo
            .find_many(
                CacheKey::Category(category_id),
                Lookup::field("categoryId", category_id),
            )
            .await
    }

    pub async fn find_by_supplier(&self, supplier_id: i64) -> StorageResult<Vec<Product>> {
        self.repo
            .find_many(
                CacheKey::Supplier(supplier_id),
                Lookup::field("supplierId", supplier_id),
            )
            .await
    }

    pub async fn find_all(&self) -> StorageResult<Vec<Product>> {
        self.repo.find_all().await
    }

    /// Insert or fully replace a product.
    pub async fn save(&self, product: Product) -> StorageResult<Product> {
        self.repo.save(product).await
    }

    /// Persist only the fields changed on `tracked`.
    ///
    /// Keys of the state tracking started from and of the new state are both
    /// invalidated, so moving a product to another category clears both
    /// category listings. Nothing is invalidated when no statement ran.
    pub async fn update(&self, tracked: &mut Tracked<Product>) -> StorageResult<PersistOutcome> {
        let before = tracked.original().cache_keys();

        let namespace = self.repo.namespace();
        let mut pending = self.repo.cache.begin_invalidation(&namespace);
        pending.extend(Product::CACHE_NAME, &before);

        let outcome = persist_changes(self.repo.store.as_ref(), tracked).await?;
        match outcome {
            PersistOutcome::Skipped => return Ok(outcome),
            PersistOutcome::Updated(0) => {
                let id = tracked.entity().id.unwrap_or_default();
                return Err(StorageError::not_found("Product", id));
            }
            PersistOutcome::Updated(_) => {}
        }

        pending.extend(Product::CACHE_NAME, &tracked.entity().cache_keys());
        pending.commit().await;
        Ok(outcome)
    }

    /// Set the stock level of a product and return its new state.
    pub async fn update_stock(&self, id: i64, quantity: i32) -> StorageResult<Product> {
        let product = self
            .repo
            .store
            .load(id)
            .await?
            .ok_or_else(|| StorageError::not_found("Product", id))?;

        let mut tracked = Tracked::new(product);
        tracked.set("stockQuantity", quantity)?;
        self.update(&mut tracked).await?;

        tracing::info!(id, quantity, "stock updated");
        Ok(tracked.into_inner())
    }

    /// Returns `false` if the product did not exist.
    pub async fn delete(&self, id: i64) -> StorageResult<bool> {
        self.repo.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{coordinator, namespaces};
    use bigdecimal::BigDecimal;
    use invcache_storage::{EntityStore, InMemoryStore};

    struct Fixture {
        store: Arc<InMemoryStore<Product>>,
        service: ProductService,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::<Product>::new());
        for (sku, category) in [("A", 3), ("C", 3), ("D", 4)] {
            store
                .save(Product {
                    name: format!("product {sku}"),
                    sku: sku.into(),
                    price: BigDecimal::from(5),
                    stock_quantity: 10,
                    category_id: Some(category),
                    ..Product::default()
                })
                .await
                .unwrap();
        }
        let service = ProductService::new(coordinator(), store.clone(), namespaces());
        Fixture { store, service }
    }

    #[tokio::test]
    async fn test_reads_are_served_from_cache() {
        let f = fixture().await;

        let first = f.service.find_by_id(1).await.unwrap().unwrap();
        let second = f.service.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(f.store.loads(), 1);

        assert_eq!(f.service.find_by_category(3).await.unwrap().len(), 2);
        assert_eq!(f.service.find_by_category(3).await.unwrap().len(), 2);
        assert_eq!(f.store.loads(), 2);
    }

    #[tokio::test]
    async fn test_missing_product_is_not_cached() {
        let f = fixture().await;
        assert!(f.service.find_by_id(99).await.unwrap().is_none());
        assert!(f.service.find_by_id(99).await.unwrap().is_none());
        assert_eq!(f.store.loads(), 2);
    }

    #[tokio::test]
    async fn test_sku_change_invalidates_old_and_new_sku() {
        let f = fixture().await;
        assert!(f.service.find_by_sku("A").await.unwrap().is_some());
        assert!(f.service.find_by_sku("B").await.unwrap().is_none());

        let product = f.service.find_by_id(1).await.unwrap().unwrap();
        let mut tracked = Tracked::new(product);
        tracked.set("sku", "B").unwrap();
        let outcome = f.service.update(&mut tracked).await.unwrap();

        assert_eq!(outcome, PersistOutcome::Updated(1));
        assert_eq!(f.store.partial_updates(), 1);
        assert!(f.service.find_by_sku("A").await.unwrap().is_none());
        assert_eq!(f.service.find_by_sku("B").await.unwrap().unwrap().id, Some(1));
        assert_eq!(f.service.find_by_id(1).await.unwrap().unwrap().sku, "B");
    }

    #[tokio::test]
    async fn test_category_move_refreshes_both_listings() {
        let f = fixture().await;
        assert_eq!(f.service.find_by_category(3).await.unwrap().len(), 2);
        assert_eq!(f.service.find_by_category(4).await.unwrap().len(), 1);

        let product = f.service.find_by_id(1).await.unwrap().unwrap();
        let mut tracked = Tracked::new(product);
        tracked.set("categoryId", Some(4_i64)).unwrap();
        f.service.update(&mut tracked).await.unwrap();

        assert_eq!(f.service.find_by_category(3).await.unwrap().len(), 1);
        assert_eq!(f.service.find_by_category(4).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_update_is_skipped() {
        let f = fixture().await;
        let product = f.service.find_by_id(1).await.unwrap().unwrap();
        let mut tracked = Tracked::new(product);
        tracked.set("sku", "A").unwrap();

        let outcome = f.service.update(&mut tracked).await.unwrap();
        assert_eq!(outcome, PersistOutcome::Skipped);
        assert_eq!(f.store.partial_updates(), 0);
    }

    #[tokio::test]
    async fn test_update_of_deleted_product_is_not_found() {
        let f = fixture().await;
        let product = f.service.find_by_id(1).await.unwrap().unwrap();
        f.store.delete_by_id(1).await.unwrap();

        let mut tracked = Tracked::new(product);
        tracked.set("sku", "Z").unwrap();
        let err = f.service.update(&mut tracked).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_stock() {
        let f = fixture().await;
        assert_eq!(f.service.find_all().await.unwrap()[0].stock_quantity, 10);

        let updated = f.service.update_stock(1, 3).await.unwrap();
        assert_eq!(updated.stock_quantity, 3);
        assert!(updated.updated_at.is_some());
        assert_eq!(f.service.find_all().await.unwrap()[0].stock_quantity, 3);
        assert!(f.service.update_stock(99, 1).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_evicts_listing() {
        let f = fixture().await;
        assert_eq!(f.service.find_all().await.unwrap().len(), 3);

        assert!(f.service.delete(2).await.unwrap());
        assert!(!f.service.delete(2).await.unwrap());
        assert_eq!(f.service.find_all().await.unwrap().len(), 2);
        assert!(f.service.find_by_id(2).await.unwrap().is_none());
    }
}
