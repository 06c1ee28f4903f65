//! Two-tier caching with cross-instance invalidation.
//!
//! ## Architecture
//!
//! - **L1 Cache (DashMap)**: In-memory, microsecond latency, per-instance
//! - **L2 Cache (Redis)**: Network, millisecond latency, shared across instances
//! - **Invalidation bus**: Pub/sub broadcast of `{cacheName, key}` after each write
//!
//! ## Cache Hierarchy
//!
//! ```text
//! read → L1 (DashMap) → L2 (Redis) → backing store
//!
//! write → store commit → evict L1 + L2 → publish → siblings evict L1
//! ```
//!
//! ## Graceful Degradation
//!
//! If Redis is unavailable or disabled, the system falls back to L1-only
//! mode and an in-process bus. Cache failures are logged and never fail the
//! caller's operation.

pub mod backend;
pub mod coordinator;
pub mod keys;
pub mod message;
pub mod pubsub;
pub mod transport;

pub use backend::{CacheBackend, CacheStats, CachedEntry, EntryKey};
pub use coordinator::{CacheCoordinator, CacheTtls, PendingInvalidations};
pub use keys::{CATEGORIES, CacheKey, Cacheable, PRODUCTS, SUPPLIERS};
pub use message::{InvalidationError, InvalidationMessage};
pub use pubsub::{BusSettings, InvalidationBus, InvalidationHandler, InvalidationPublisher};
pub use transport::{
    InvalidationTransport, LocalTransport, PayloadStream, RedisTransport, TransportError,
};
