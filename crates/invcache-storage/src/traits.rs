//! The backing-store contract.
//!
//! The store is the source of truth. Caches in front of it may be stale; the
//! store never is.

use std::sync::Arc;

use async_trait::async_trait;

use crate::StorageResult;
use crate::entity::Entity;
use crate::update::PartialUpdate;
use crate::value::FieldValue;

/// Secondary lookups supported by every store.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Every stored entity.
    All,
    /// Entities whose `field` currently holds `value`.
    FieldEquals {
        field: &'static str,
        value: FieldValue,
    },
}

impl Lookup {
    pub fn field(field: &'static str, value: impl Into<FieldValue>) -> Self {
        Self::FieldEquals {
            field,
            value: value.into(),
        }
    }
}

/// Durable storage for one entity type.
///
/// Implementations must be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use invcache_storage::{EntityStore, StorageError};
///
/// async fn require(store: &dyn EntityStore<Product>, id: i64) -> Result<Product, StorageError> {
///     store
///         .load(id)
///         .await?
///         .ok_or_else(|| StorageError::not_found("Product", id))
/// }
/// ```
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Loads an entity by identifier. `None` if it does not exist.
    async fn load(&self, id: i64) -> StorageResult<Option<E>>;

    /// Loads every entity matching `lookup`, ordered by identifier.
    async fn load_by(&self, lookup: &Lookup) -> StorageResult<Vec<E>>;

    /// Inserts or fully replaces an entity.
    ///
    /// An entity without an identifier is assigned one. The stored state,
    /// timestamps included, is returned.
    async fn save(&self, entity: E) -> StorageResult<E>;

    /// Deletes an entity. Returns `false` if nothing was deleted.
    async fn delete_by_id(&self, id: i64) -> StorageResult<bool>;

    /// Applies a partial update and returns the number of affected rows.
    async fn execute_partial_update(&self, update: &PartialUpdate) -> StorageResult<u64>;
}

/// Type alias for a shared, dynamically dispatched store.
pub type DynStore<E> = Arc<dyn EntityStore<E>>;
