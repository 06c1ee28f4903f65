//! Wire format of cross-instance invalidations.

use serde::{Deserialize, Serialize};

/// Errors raised while encoding or decoding an [`InvalidationMessage`].
#[derive(Debug, thiserror::Error)]
pub enum InvalidationError {
    #[error("failed to encode invalidation message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed invalidation message: {0}")]
    Decode(#[source] serde_json::Error),
}

/// "Entry `key` of cache `cache_name` is stale."
///
/// Encoded as a flat JSON object with exactly two string fields,
/// `{"cacheName":"products","key":"42"}`. Unknown fields are ignored on
/// decode; a missing or non-string field makes the payload malformed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationMessage {
    pub cache_name: String,
    pub key: String,
}

impl InvalidationMessage {
    pub fn new(cache_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            key: key.into(),
        }
    }

    pub fn encode(&self) -> Result<String, InvalidationError> {
        serde_json::to_string(self).map_err(InvalidationError::Encode)
    }

    pub fn decode(payload: &str) -> Result<Self, InvalidationError> {
        serde_json::from_str(payload).map_err(InvalidationError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_is_flat_camel_case() {
        let message = InvalidationMessage::new("products", "42");
        assert_eq!(
            message.encode().unwrap(),
            r#"{"cacheName":"products","key":"42"}"#
        );
        assert_eq!(InvalidationMessage::decode(&message.encode().unwrap()).unwrap(), message);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let decoded =
            InvalidationMessage::decode(r#"{"key":"sku:A","origin":"node-2","cacheName":"products"}"#)
                .unwrap();
        assert_eq!(decoded, InvalidationMessage::new("products", "sku:A"));
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        for payload in [
            "",
            "not json",
            r#"{"cacheName":"products"}"#,
            r#"{"key":"42"}"#,
            r#"{"cacheName":"products","key":42}"#,
            r#"{"cacheName":null,"key":"42"}"#,
        ] {
            assert!(
                InvalidationMessage::decode(payload).is_err(),
                "{payload:?} should be rejected"
            );
        }
    }
}
