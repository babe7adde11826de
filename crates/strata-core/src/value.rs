//! The dynamic value model for cached entries.
//!
//! Cached values are structured but schemaless: scalars, ordered sequences,
//! string-keyed mappings and named records. `CacheValue` is the tagged
//! variant the codec encodes to and decodes from; `Bytes` carries payloads
//! the codec could not classify (non-UTF-8 data or foreign formats).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A value stored in the cache.
///
/// Cloning is deep; the local tier hands out clones so that callers can
/// mutate structured values without affecting the cached copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CacheValue {
    /// Absent/null value.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// UTF-8 string scalar.
    Str(String),
    /// Raw bytes the codec passed through unmodified.
    ///
    /// Top-level `Bytes` round-trip exactly through the tagged codec.
    /// Nested inside a container, the payload is carried as a string and
    /// decodes back as [`Str`](Self::Str) when it is valid UTF-8.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    List(Vec<CacheValue>),
    /// String-keyed mapping; iteration order is insertion order.
    Map(IndexMap<String, CacheValue>),
    /// Named record with ordered fields.
    Record {
        /// Record type name.
        name: String,
        /// Record fields in declaration order.
        fields: IndexMap<String, CacheValue>,
    },
}

impl CacheValue {
    /// Returns `true` for scalar variants (everything except `List`, `Map`
    /// and `Record`).
    #[must_use]
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Map(_) | Self::Record { .. })
    }

    /// Coerces this value to an integer, if it has an integer
    /// interpretation. Used by the local-only increment/decrement path.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Returns a short name of the variant for logging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Record { .. } => "record",
        }
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_i64_coercion() {
        assert_eq!(CacheValue::Int(7).as_i64(), Some(7));
        assert_eq!(CacheValue::from("42").as_i64(), Some(42));
        assert_eq!(CacheValue::from(" 42 ").as_i64(), Some(42));
        assert_eq!(CacheValue::from("nope").as_i64(), None);
        assert_eq!(CacheValue::Bool(true).as_i64(), None);
    }

    #[test]
    fn test_scalar_classification() {
        assert!(CacheValue::Null.is_scalar());
        assert!(CacheValue::from("x").is_scalar());
        assert!(!CacheValue::List(vec![]).is_scalar());
        assert!(!CacheValue::Map(IndexMap::new()).is_scalar());
    }
}
