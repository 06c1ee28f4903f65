//! Column values exchanged between entities, the tracker and the store.

use bigdecimal::BigDecimal;
use time::OffsetDateTime;

use crate::error::TrackingError;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Decimal(BigDecimal),
    Timestamp(OffsetDateTime),
}

impl FieldValue {
    /// Short name of the value kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Decimal(_) => "decimal",
            Self::Timestamp(_) => "timestamp",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Value equality used by change tracking.
    ///
    /// `Null` equals `Null`. Decimals compare after normalization, so `1.0`
    /// and `1.00` are the same value. Values of different kinds are never equal.
    pub fn same_as(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (Self::Decimal(a), Self::Decimal(b)) => a.normalized() == b.normalized(),
            (a, b) => a == b,
        }
    }

    /// Unwrap an optional text value for assignment to `field`.
    pub fn into_text(self, field: &str) -> Result<Option<String>, TrackingError> {
        match self {
            Self::Null => Ok(None),
            Self::Text(value) => Ok(Some(value)),
            other => Err(TrackingError::type_mismatch(field, "text", other.kind())),
        }
    }

    /// Unwrap an optional integer value for assignment to `field`.
    pub fn into_int(self, field: &str) -> Result<Option<i64>, TrackingError> {
        match self {
            Self::Null => Ok(None),
            Self::Int(value) => Ok(Some(value)),
            other => Err(TrackingError::type_mismatch(field, "int", other.kind())),
        }
    }

    /// Unwrap an optional decimal value for assignment to `field`.
    ///
    /// Integers are widened to decimals.
    pub fn into_decimal(self, field: &str) -> Result<Option<BigDecimal>, TrackingError> {
        match self {
            Self::Null => Ok(None),
            Self::Decimal(value) => Ok(Some(value)),
            Self::Int(value) => Ok(Some(BigDecimal::from(value))),
            other => Err(TrackingError::type_mismatch(field, "decimal", other.kind())),
        }
    }

    /// Unwrap an optional timestamp value for assignment to `field`.
    pub fn into_timestamp(self, field: &str) -> Result<Option<OffsetDateTime>, TrackingError> {
        match self {
            Self::Null => Ok(None),
            Self::Timestamp(value) => Ok(Some(value)),
            other => Err(TrackingError::type_mismatch(field, "timestamp", other.kind())),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<BigDecimal> for FieldValue {
    fn from(value: BigDecimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<OffsetDateTime> for FieldValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
