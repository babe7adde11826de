//! Derived-key construction.
//!
//! Every cache operation addresses the remote tier through a derived key:
//! `lowercase(salt + prefix + ":" + group + ":" + key)`. The tier delimiter
//! (`:`) is replaced inside the raw key and group so that user input can
//! never collide with another namespace, and the prefix is stripped of
//! trailing separator characters before use.

/// Group applied when the caller passes an empty group name.
pub const DEFAULT_GROUP: &str = "default";

/// Characters trimmed from both ends of a prefix before key composition.
const PREFIX_TRIM: [char; 4] = ['_', '-', ':', '$'];

/// Builds the canonical derived key for `(key, group)` under the given salt
/// and prefix.
///
/// Pure and deterministic: the same inputs always produce the same derived
/// key. Which prefix applies (global vs tenant) is the caller's decision,
/// driven by group policy.
#[must_use]
pub fn build_key(key: &str, group: &str, salt: &str, prefix: &str) -> String {
    let group = if group.is_empty() { DEFAULT_GROUP } else { group };

    let key = key.replace(':', "-");
    let group = group.replace(':', "-");
    let prefix = prefix.trim_matches(|c| PREFIX_TRIM.contains(&c));

    format!("{salt}{prefix}:{group}:{key}").to_lowercase()
}
