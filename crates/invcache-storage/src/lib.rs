//! # invcache-storage
//!
//! Backing-store abstractions for the inventory cache.
//!
//! This crate does not talk to a database itself. It defines:
//! - [`Entity`] and its static [`EntityDescriptor`]: which fields exist, which
//!   are tracked for changes and which column each one maps to
//! - [`Tracked`]: an entity paired with the set of fields mutated since the
//!   last persist
//! - [`build_update`]: turns that dirty set into a minimal `UPDATE` statement
//! - [`EntityStore`]: the contract a backing store must fulfil
//! - [`InMemoryStore`]: a reference store used by tests and single-node runs
//!
//! ## Example
//!
//! ```ignore
//! use invcache_storage::{persist_changes, Tracked};
//!
//! let product = store.load(5).await?.expect("exists");
//! let mut tracked = Tracked::new(product);
//! tracked.set("sku", "B")?;
//!
//! // UPDATE PRODUCTS SET SKU = $1, UPDATED_AT = $2 WHERE ID = $3
//! persist_changes(&store, &mut tracked).await?;
//! ```

mod entity;
mod error;
pub mod memory;
mod tracking;
mod traits;
pub mod update;
mod value;

pub use entity::{Entity, EntityDescriptor, FieldDescriptor, camel_to_upper_snake};
pub use error::{ErrorCategory, StorageError, TrackingError};
pub use memory::InMemoryStore;
pub use tracking::{DirtyFields, Tracked};
pub use traits::{DynStore, EntityStore, Lookup};
pub use update::{Assignment, PartialUpdate, PersistOutcome, build_update, persist_changes};
pub use value::FieldValue;

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use invcache_storage::prelude::*;
/// ```
pub mod prelude {
    pub use crate::entity::{Entity, EntityDescriptor, FieldDescriptor};
    pub use crate::error::{StorageError, TrackingError};
    pub use crate::tracking::{DirtyFields, Tracked};
    pub use crate::traits::{DynStore, EntityStore, Lookup};
    pub use crate::update::{PartialUpdate, PersistOutcome, build_update, persist_changes};
    pub use crate::value::FieldValue;
    pub use crate::StorageResult;
}
