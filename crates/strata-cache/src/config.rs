//! Engine configuration.

use serde::{Deserialize, Serialize};

use strata_core::CodecMode;

/// Configuration for a [`StrataCache`](crate::StrataCache) instance.
///
/// All fields have defaults, so a config can be deserialized from a partial
/// document or built with `CacheConfig::default()` and adjusted field by
/// field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Salt prepended to every derived key. Namespaces this deployment's
    /// entries inside a shared backend; also the anchor for selective
    /// flushing (an empty salt disables it).
    #[serde(default)]
    pub key_salt: String,

    /// Prefix applied to keys in global groups.
    #[serde(default)]
    pub global_prefix: String,

    /// Initial prefix applied to keys in non-global groups. Can be changed
    /// at runtime with [`StrataCache::switch_tenant`](crate::StrataCache::switch_tenant).
    #[serde(default)]
    pub tenant_prefix: String,

    /// When `true` (and `key_salt` is non-empty), flushes delete only keys
    /// under the salt instead of wiping whole backend nodes.
    #[serde(default)]
    pub selective_flush: bool,

    /// Upper bound for entry lifetimes, in seconds. Requested expirations
    /// above the bound (including "never expire") are clamped down to it.
    #[serde(default)]
    pub max_ttl: Option<u64>,

    /// Degradation mode. When `true`, backend failures demote the instance
    /// to local-only operation and calls keep succeeding; when `false`,
    /// the failing call returns the transport error.
    #[serde(default = "default_graceful")]
    pub graceful: bool,

    /// Value encoding for the remote tier.
    #[serde(default)]
    pub codec: CodecMode,

    /// Groups whose keys use `global_prefix` and survive tenant switches.
    #[serde(default)]
    pub global_groups: Vec<String>,

    /// Groups that never reach the remote tier.
    #[serde(default)]
    pub ignored_groups: Vec<String>,

    /// Groups excluded from selective flushes.
    #[serde(default)]
    pub unflushable_groups: Vec<String>,
}

fn default_graceful() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_salt: String::new(),
            global_prefix: String::new(),
            tenant_prefix: String::new(),
            selective_flush: false,
            max_ttl: None,
            graceful: default_graceful(),
            codec: CodecMode::default(),
            global_groups: Vec::new(),
            ignored_groups: Vec::new(),
            unflushable_groups: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert!(config.key_salt.is_empty());
        assert!(config.graceful);
        assert!(!config.selective_flush);
        assert_eq!(config.max_ttl, None);
        assert_eq!(config.codec, CodecMode::Tagged);
    }

    #[test]
    fn test_deserialize_partial_document() {
        let config: CacheConfig = serde_json::from_str(
            r#"{
                "key_salt": "abc",
                "selective_flush": true,
                "global_groups": ["users", "site-options"],
                "graceful": false
            }"#,
        )
        .unwrap();

        assert_eq!(config.key_salt, "abc");
        assert!(config.selective_flush);
        assert!(!config.graceful);
        assert_eq!(config.global_groups, vec!["users", "site-options"]);
        // Untouched fields keep their defaults.
        assert!(config.ignored_groups.is_empty());
        assert_eq!(config.codec, CodecMode::Tagged);
    }

    #[test]
    fn test_codec_mode_round_trips_through_serde() {
        let config = CacheConfig {
            codec: CodecMode::Binary,
            ..CacheConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.codec, CodecMode::Binary);
    }
}
