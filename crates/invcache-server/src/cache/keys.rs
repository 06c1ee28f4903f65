//! Cache names and the canonical key forms used inside them.

use std::fmt;

/// Cache holding products and product listings.
pub const PRODUCTS: &str = "products";
/// Cache holding categories.
pub const CATEGORIES: &str = "categories";
/// Cache holding suppliers.
pub const SUPPLIERS: &str = "suppliers";

/// A key within one named cache.
///
/// The rendered form is what goes on the wire and into the shared tier, so
/// it must stay stable across releases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// Single entity by identifier: `42`.
    Id(i64),
    /// Full listing: `all`.
    All,
    /// Product by SKU: `sku:A-100`.
    Sku(String),
    /// Products in a category: `category:3`.
    Category(i64),
    /// Products from a supplier: `supplier:7`.
    Supplier(i64),
    /// Entity by unique name: `name:Tools`.
    Name(String),
    /// Supplier by e-mail: `email:sales@acme.test`.
    Email(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::All => f.write_str("all"),
            Self::Sku(sku) => write!(f, "sku:{sku}"),
            Self::Category(id) => write!(f, "category:{id}"),
            Self::Supplier(id) => write!(f, "supplier:{id}"),
            Self::Name(name) => write!(f, "name:{name}"),
            Self::Email(email) => write!(f, "email:{email}"),
        }
    }
}

/// An entity cached under a fixed, enumerated set of keys.
///
/// Writes evict exactly these keys. Queries that are not listed here, such
/// as keyword searches, are not invalidated by writes and age out by TTL.
pub trait Cacheable {
    /// Cache the entity and its listings live in.
    const CACHE_NAME: &'static str;

    /// Every key this state of the entity participates in, `all` included.
    fn cache_keys(&self) -> Vec<CacheKey>;
}
