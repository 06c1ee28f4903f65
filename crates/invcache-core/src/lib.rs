pub mod error;
pub mod namespace;

pub use error::{CoreError, ErrorCategory, Result};
pub use namespace::{Namespace, NamespaceContext, Tenant};
