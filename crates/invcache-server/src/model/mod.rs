//! Inventory entities served through the cache.

mod category;
mod product;
mod supplier;

pub use category::Category;
pub use product::Product;
pub use supplier::Supplier;

use invcache_storage::{FieldValue, TrackingError};

/// Unwrap a value assigned to a non-nullable field.
fn required<T>(field: &str, value: Option<T>, expected: &'static str) -> Result<T, TrackingError> {
    value.ok_or_else(|| TrackingError::type_mismatch(field, expected, "null"))
}

fn required_text(field: &str, value: FieldValue) -> Result<String, TrackingError> {
    required(field, value.into_text(field)?, "text")
}
