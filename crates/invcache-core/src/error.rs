use thiserror::Error;

/// Core error types for namespace handling and configuration
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid tenant identifier: {0:?}")]
    InvalidTenant(String),

    #[error("Invalid namespace: {0:?}")]
    InvalidNamespace(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    /// Create a new InvalidTenant error
    pub fn invalid_tenant(tenant: impl Into<String>) -> Self {
        Self::InvalidTenant(tenant.into())
    }

    /// Create a new InvalidNamespace error
    pub fn invalid_namespace(namespace: impl Into<String>) -> Self {
        Self::InvalidNamespace(namespace.into())
    }

    /// Create a new Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error was caused by caller input
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidTenant(_) | Self::InvalidNamespace(_))
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidTenant(_) | Self::InvalidNamespace(_) => ErrorCategory::Validation,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
