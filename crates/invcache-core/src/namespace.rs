//! Namespace scoping for cache keys.
//!
//! Every cache entry lives under a [`Namespace`]: the configured base
//! identifier, optionally suffixed with a tenant (`inventory:acme`). Cache
//! operations take the namespace as an explicit argument; the
//! [`NamespaceContext`] only resolves which namespace is active for the
//! current unit of work.
//!
//! ## Scoping
//!
//! The active tenant is a tokio task-local. [`NamespaceContext::execute_with_tenant`]
//! installs a tenant for the duration of one future and restores the enclosing
//! value when that future completes, returns an error, panics or is dropped.
//! Tasks spawned from inside a scope do not inherit it.
//!
//! ```
//! use invcache_core::{NamespaceContext, Tenant};
//!
//! # tokio_test::block_on(async {
//! let ctx = NamespaceContext::new("inventory").unwrap();
//! let tenant = Tenant::parse("acme").unwrap();
//!
//! let key = ctx
//!     .execute_with_tenant(tenant, |ns| async move { ns.to_string() })
//!     .await;
//! assert_eq!(key, "inventory:acme");
//! assert_eq!(ctx.current().to_string(), "inventory");
//! # });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, Result};

tokio::task_local! {
    static ACTIVE_TENANT: Option<Tenant>;
}

/// Separator between namespace segments in rendered keys.
pub const SEPARATOR: char = ':';

/// Characters with meaning in shared-tier key patterns (`SCAN MATCH` globs
/// and `{...}` hash tags). Never allowed in a namespace segment.
pub const RESERVED: &[char] = &['*', '?', '[', ']', '\\', '{', '}'];

/// Whether `segment` can be used as one namespace segment.
fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.contains(SEPARATOR)
        && !segment.contains(RESERVED)
        && !segment.chars().any(char::is_whitespace)
}

/// A validated tenant identifier.
///
/// Tenants become part of every cache key, so they must be non-empty and
/// may not contain whitespace, the `:` separator or [`RESERVED`] characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tenant(Arc<str>);

impl Tenant {
    /// Parse and validate a tenant identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        if !is_valid_segment(raw) {
            return Err(CoreError::invalid_tenant(raw));
        }
        Ok(Self(Arc::from(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Tenant {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Tenant> for String {
    fn from(value: Tenant) -> Self {
        value.0.to_string()
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Isolation domain for cache keys: base identifier plus optional tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    base: Arc<str>,
    tenant: Option<Tenant>,
}

impl Namespace {
    /// Create a namespace without a tenant.
    ///
    /// Fails under the same rules as [`Tenant::parse`].
    pub fn new(base: &str) -> Result<Self> {
        if !is_valid_segment(base) {
            return Err(CoreError::invalid_namespace(base));
        }
        Ok(Self {
            base: Arc::from(base),
            tenant: None,
        })
    }

    /// Same base, scoped to `tenant`.
    pub fn with_tenant(&self, tenant: Tenant) -> Self {
        Self {
            base: Arc::clone(&self.base),
            tenant: Some(tenant),
        }
    }

    /// Same base, without a tenant.
    pub fn without_tenant(&self) -> Self {
        Self {
            base: Arc::clone(&self.base),
            tenant: None,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn tenant(&self) -> Option<&Tenant> {
        self.tenant.as_ref()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tenant {
            Some(tenant) => write!(f, "{}{SEPARATOR}{}", self.base, tenant),
            None => f.write_str(&self.base),
        }
    }
}

/// Resolves the active namespace for the current task.
#[derive(Debug, Clone)]
pub struct NamespaceContext {
    base: Namespace,
}

impl NamespaceContext {
    /// Create a context rooted at `base` (e.g. `"inventory"`).
    pub fn new(base: &str) -> Result<Self> {
        Ok(Self {
            base: Namespace::new(base)?,
        })
    }

    /// The namespace used when no tenant is active.
    pub fn base(&self) -> &Namespace {
        &self.base
    }

    /// The tenant installed by the innermost enclosing scope of this task.
    pub fn current_tenant() -> Option<Tenant> {
        ACTIVE_TENANT.try_with(|tenant| tenant.clone()).ok().flatten()
    }

    /// The namespace active for the current task.
    pub fn current(&self) -> Namespace {
        match Self::current_tenant() {
            Some(tenant) => self.base.with_tenant(tenant),
            None => self.base.clone(),
        }
    }

    /// Namespace for `tenant` without entering a scope.
    pub fn tenant_namespace(&self, tenant: &Tenant) -> Namespace {
        self.base.with_tenant(tenant.clone())
    }

    /// Run `op` with `tenant` active and hand it the resolved namespace.
    ///
    /// The previously active tenant (if any) is visible again as soon as the
    /// returned future completes or is dropped, whatever `op` returned.
    pub async fn execute_with_tenant<F, Fut, T>(&self, tenant: Tenant, op: F) -> T
    where
        F: FnOnce(Namespace) -> Fut,
        Fut: Future<Output = T>,
    {
        let namespace = self.tenant_namespace(&tenant);
        debug!(namespace = %namespace, "entering tenant scope");
        ACTIVE_TENANT
            .scope(Some(tenant), async move { op(namespace).await })
            .await
    }

    /// Blocking counterpart of [`execute_with_tenant`](Self::execute_with_tenant).
    pub fn execute_with_tenant_sync<F, T>(&self, tenant: Tenant, op: F) -> T
    where
        F: FnOnce(Namespace) -> T,
    {
        let namespace = self.tenant_namespace(&tenant);
        debug!(namespace = %namespace, "entering tenant scope");
        ACTIVE_TENANT.sync_scope(Some(tenant), || op(namespace))
    }

    /// Run `op` with no tenant active, even inside an enclosing tenant scope.
    pub async fn execute_without_tenant<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce(Namespace) -> Fut,
        Fut: Future<Output = T>,
    {
        let namespace = self.base.clone();
        ACTIVE_TENANT
            .scope(None, async move { op(namespace).await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(raw: &str) -> Tenant {
        Tenant::parse(raw).unwrap()
    }

    #[test]
    fn test_tenant_validation() {
        assert!(Tenant::parse("acme").is_ok());
        assert!(Tenant::parse("tenant-42_eu").is_ok());
        assert!(Tenant::parse("").is_err());
        assert!(Tenant::parse("a:b").is_err());
        assert!(Tenant::parse("a b").is_err());
        for raw in ["*", "a*", "t?", "[ab]", "a\\b", "{t}"] {
            assert!(Tenant::parse(raw).is_err(), "{raw} accepted");
        }
    }

    #[test]
    fn test_tenant_try_from_string() {
        let parsed = Tenant::try_from("t1".to_string()).unwrap();
        assert_eq!(parsed.as_str(), "t1");
        assert_eq!(String::from(parsed), "t1");
        assert!(Tenant::try_from("t:1".to_string()).is_err());
    }

    #[test]
    fn test_namespace_display() {
        let ns = Namespace::new("inventory").unwrap();
        assert_eq!(ns.to_string(), "inventory");
        assert_eq!(ns.with_tenant(tenant("t1")).to_string(), "inventory:t1");
        assert_eq!(
            ns.with_tenant(tenant("t1")).without_tenant().to_string(),
            "inventory"
        );
    }

    #[test]
    fn test_namespace_rejects_empty_base() {
        assert!(Namespace::new("").is_err());
        assert!(NamespaceContext::new(" inv").is_err());
        assert!(Namespace::new("inv:eu").is_err());
        assert!(Namespace::new("inv*").is_err());
    }

    #[test]
    fn test_current_outside_scope_is_base() {
        let ctx = NamespaceContext::new("base").unwrap();
        assert_eq!(ctx.current().to_string(), "base");
        assert!(NamespaceContext::current_tenant().is_none());
    }

    #[tokio::test]
    async fn test_scope_sets_and_restores_tenant() {
        let ctx = NamespaceContext::new("base").unwrap();

        let seen = ctx
            .execute_with_tenant(tenant("t1"), |ns| {
                let ctx = ctx.clone();
                async move { (ns.to_string(), ctx.current().to_string()) }
            })
            .await;

        assert_eq!(seen, ("base:t1".to_string(), "base:t1".to_string()));
        assert_eq!(ctx.current().to_string(), "base");
    }

    #[tokio::test]
    async fn test_nested_scope_restores_outer_on_ok_and_err() {
        let ctx = &NamespaceContext::new("base").unwrap();

        ctx.execute_with_tenant(tenant("t1"), |_| async {
            let inner: std::result::Result<(), &str> = ctx
                .execute_with_tenant(tenant("t2"), |ns| async move {
                    assert_eq!(ns.to_string(), "base:t2");
                    assert_eq!(ctx.current().to_string(), "base:t2");
                    Err("boom")
                })
                .await;
            assert!(inner.is_err());
            assert_eq!(ctx.current().to_string(), "base:t1");

            let inner: std::result::Result<u8, &str> = ctx
                .execute_with_tenant(tenant("t2"), |_| async { Ok(7) })
                .await;
            assert_eq!(inner, Ok(7));
            assert_eq!(ctx.current().to_string(), "base:t1");
        })
        .await;

        assert_eq!(ctx.current().to_string(), "base");
    }

    #[test]
    fn test_sync_scope_restores_after_panic() {
        let ctx = NamespaceContext::new("base").unwrap();

        ctx.execute_with_tenant_sync(tenant("t1"), |_| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                ctx.execute_with_tenant_sync(tenant("t2"), |_| panic!("operation failed"))
            }));
            assert!(result.is_err());
            assert_eq!(ctx.current().to_string(), "base:t1");
        });

        assert_eq!(ctx.current().to_string(), "base");
    }

    #[tokio::test]
    async fn test_without_tenant_masks_outer_scope() {
        let ctx = &NamespaceContext::new("base").unwrap();

        ctx.execute_with_tenant(tenant("t1"), |_| async {
            let inner = ctx
                .execute_without_tenant(|ns| async move { ns.to_string() })
                .await;
            assert_eq!(inner, "base");
            assert_eq!(ctx.current().to_string(), "base:t1");
        })
        .await;
    }

    #[tokio::test]
    async fn test_scope_does_not_leak_into_spawned_tasks() {
        let ctx = NamespaceContext::new("base").unwrap();

        let spawned = ctx
            .execute_with_tenant(tenant("t1"), |_| {
                let ctx = ctx.clone();
                async move {
                    tokio::spawn(async move { ctx.current().to_string() })
                        .await
                        .unwrap()
                }
            })
            .await;

        assert_eq!(spawned, "base");
    }

    #[tokio::test]
    async fn test_concurrent_scopes_are_isolated() {
        let ctx = NamespaceContext::new("base").unwrap();
        let mut handles = Vec::new();

        for i in 0..8 {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                let t = tenant(&format!("t{i}"));
                ctx.execute_with_tenant(t, |_| async {
                    tokio::task::yield_now().await;
                    ctx.current().to_string()
                })
                .await
            }));
        }

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), format!("base:t{i}"));
        }
    }
}
