//! Multi-node invalidation and tenant isolation, end to end.
//!
//! Nodes share one backing store and one in-process transport, which stands
//! in for the broker between separate instances.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use futures_util::FutureExt;
use invcache_core::{Namespace, NamespaceContext, Tenant};
use invcache_server::cache::{CATEGORIES, InvalidationTransport, PRODUCTS};
use invcache_server::model::{Category, Product};
use invcache_server::{AppConfig, CacheServer, LocalTransport, ServerBuilder, Stores};
use invcache_storage::{EntityStore, InMemoryStore};

struct Cluster {
    products: Arc<InMemoryStore<Product>>,
    categories: Arc<InMemoryStore<Category>>,
    transport: Arc<LocalTransport>,
    a: CacheServer,
    b: CacheServer,
}

async fn cluster() -> Cluster {
    let products = Arc::new(InMemoryStore::<Product>::new());
    let categories = Arc::new(InMemoryStore::<Category>::new());
    let stores = Stores {
        products: products.clone(),
        categories: categories.clone(),
        suppliers: Arc::new(InMemoryStore::new()),
    };
    let transport = Arc::new(LocalTransport::default());

    let a = node(&stores, &transport).await;
    let b = node(&stores, &transport).await;

    Cluster {
        products,
        categories,
        transport,
        a,
        b,
    }
}

async fn node(stores: &Stores, transport: &Arc<LocalTransport>) -> CacheServer {
    ServerBuilder::new()
        .with_config(AppConfig::default())
        .with_stores(stores.clone())
        .with_transport(transport.clone())
        .build()
        .await
        .expect("build node")
}

fn product(id: i64, sku: &str) -> Product {
    Product {
        id: Some(id),
        name: format!("product {id}"),
        sku: sku.into(),
        price: BigDecimal::from(12),
        stock_quantity: 5,
        ..Product::default()
    }
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

fn base() -> Namespace {
    Namespace::new("inventory").unwrap()
}

#[tokio::test]
async fn save_on_one_node_evicts_sibling_entry() {
    let c = cluster().await;
    c.products.save(product(42, "A")).await.unwrap();

    // B caches the current state
    let cached = c.b.products().find_by_id(42).await.unwrap().unwrap();
    assert_eq!(cached.name, "product 42");
    assert_eq!(c.products.loads(), 1);

    let mut renamed = product(42, "A");
    renamed.name = "renamed".into();
    c.a.products().save(renamed).await.unwrap();
    c.a.publisher().flush().await;

    let b = c.b.coordinator().clone();
    assert!(
        eventually(|| {
            let b = b.clone();
            async move { b.get::<Product>(&base(), PRODUCTS, 42).await.is_none() }
        })
        .await,
        "sibling entry was not evicted"
    );

    let reloaded = c.b.products().find_by_id(42).await.unwrap().unwrap();
    assert_eq!(reloaded.name, "renamed");

    c.a.shutdown().await;
    c.b.shutdown().await;
}

#[tokio::test]
async fn remote_invalidation_reaches_every_tenant() {
    let c = cluster().await;
    c.products.save(product(7, "T")).await.unwrap();

    let ctx = c.b.namespaces().clone();
    for tenant in ["acme", "globex"] {
        let tenant = Tenant::parse(tenant).unwrap();
        ctx.execute_with_tenant(tenant, |_| async {
            c.b.products().find_by_id(7).await.unwrap();
        })
        .await;
    }
    assert_eq!(c.b.coordinator().stats().l1_entries, 2);

    c.a.products().update_stock(7, 1).await.unwrap();
    c.a.publisher().flush().await;

    let b = c.b.coordinator().clone();
    assert!(
        eventually(|| {
            let b = b.clone();
            async move { b.stats().l1_entries == 0 }
        })
        .await
    );
}

#[tokio::test]
async fn malformed_payload_does_not_stop_listener() {
    let c = cluster().await;
    c.products.save(product(9, "M")).await.unwrap();
    c.b.products().find_by_id(9).await.unwrap();

    c.transport
        .send("cache-invalidation", "not json".to_string())
        .await
        .unwrap();
    c.transport
        .send(
            "cache-invalidation",
            r#"{"cacheName":"products","key":"9"}"#.to_string(),
        )
        .await
        .unwrap();

    let b = c.b.coordinator().clone();
    assert!(
        eventually(|| {
            let b = b.clone();
            async move { b.get::<Product>(&base(), PRODUCTS, 9).await.is_none() }
        })
        .await
    );
}

#[tokio::test]
async fn tenants_are_cached_separately() {
    let c = cluster().await;
    c.categories
        .save(Category {
            name: "Tools".into(),
            ..Category::default()
        })
        .await
        .unwrap();

    let ctx = c.a.namespaces().clone();
    let t1 = Tenant::parse("t1").unwrap();
    let t2 = Tenant::parse("t2").unwrap();

    let ns_t1 = ctx
        .execute_with_tenant(t1, |ns| async {
            assert!(c.a.categories().find_by_id(1).await.unwrap().is_some());
            ns
        })
        .await;
    assert_eq!(ns_t1.to_string(), "inventory:t1");
    assert!(
        c.a.coordinator()
            .get::<Category>(&ns_t1, CATEGORIES, 1)
            .await
            .is_some()
    );

    let ns_t2 = ctx.tenant_namespace(&t2);
    assert!(
        c.a.coordinator()
            .get::<Category>(&ns_t2, CATEGORIES, 1)
            .await
            .is_none()
    );

    ctx.execute_with_tenant(t2, |_| async {
        c.a.categories().find_by_id(1).await.unwrap();
    })
    .await;
    assert_eq!(c.categories.loads(), 2);

    // Administrative clear of one tenant leaves the other alone
    c.a.coordinator().clear_namespace(&ns_t1).await;
    assert!(
        c.a.coordinator()
            .get::<Category>(&ns_t1, CATEGORIES, 1)
            .await
            .is_none()
    );
    assert!(
        c.a.coordinator()
            .get::<Category>(&ns_t2, CATEGORIES, 1)
            .await
            .is_some()
    );
}

#[tokio::test]
async fn nested_tenant_scope_restores_outer_tenant() {
    let ctx = NamespaceContext::new("inventory").unwrap();
    let t1 = Tenant::parse("t1").unwrap();
    let t2 = Tenant::parse("t2").unwrap();

    ctx.execute_with_tenant(t1, |_| async {
        let inner: Result<(), &str> = ctx
            .execute_with_tenant(t2.clone(), |ns| async move {
                assert_eq!(ns.to_string(), "inventory:t2");
                Err("store rejected the write")
            })
            .await;
        assert!(inner.is_err());
        assert_eq!(ctx.current().to_string(), "inventory:t1");

        let panicked: Result<(), _> = AssertUnwindSafe(ctx.execute_with_tenant(t2, |_| async {
            panic!("handler failed");
        }))
        .catch_unwind()
        .await;
        assert!(panicked.is_err());
        assert_eq!(ctx.current().to_string(), "inventory:t1");
    })
    .await;

    assert_eq!(ctx.current().to_string(), "inventory");
}
