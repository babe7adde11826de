//! Group routing policy.
//!
//! Three additive sets classify groups: global groups share one prefix
//! across tenants, ignored groups never reach the remote tier, and
//! unflushable groups are excluded from selective flushes. Groups are only
//! ever added; an unlisted group behaves as a tenant-scoped, persistent,
//! flushable group.

use std::collections::HashSet;
use std::sync::RwLock;

/// Classification sets consulted on every operation.
pub struct GroupPolicy {
    global: RwLock<HashSet<String>>,
    ignored: RwLock<HashSet<String>>,
    unflushable: RwLock<HashSet<String>>,
}

impl GroupPolicy {
    /// Builds a policy from the three seed sets.
    pub fn new(
        global: impl IntoIterator<Item = String>,
        ignored: impl IntoIterator<Item = String>,
        unflushable: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            global: RwLock::new(global.into_iter().collect()),
            ignored: RwLock::new(ignored.into_iter().collect()),
            unflushable: RwLock::new(unflushable.into_iter().collect()),
        }
    }

    /// Whether `group` uses the global prefix.
    pub fn is_global(&self, group: &str) -> bool {
        self.global.read().expect("policy lock poisoned").contains(group)
    }

    /// Whether `group` is local-only.
    pub fn is_ignored(&self, group: &str) -> bool {
        self.ignored.read().expect("policy lock poisoned").contains(group)
    }

    /// Registers additional global groups.
    pub fn add_global(&self, groups: impl IntoIterator<Item = String>) {
        self.global.write().expect("policy lock poisoned").extend(groups);
    }

    /// Registers additional local-only groups.
    pub fn add_ignored(&self, groups: impl IntoIterator<Item = String>) {
        self.ignored.write().expect("policy lock poisoned").extend(groups);
    }

    /// Registers additional groups excluded from selective flushes.
    pub fn add_unflushable(&self, groups: impl IntoIterator<Item = String>) {
        self.unflushable.write().expect("policy lock poisoned").extend(groups);
    }

    /// Folds every global group into the ignored set. Called once when the
    /// instance degrades to local-only operation; the global set itself is
    /// left intact so key derivation is unchanged.
    pub fn demote_globals(&self) {
        let globals: Vec<String> = self
            .global
            .read()
            .expect("policy lock poisoned")
            .iter()
            .cloned()
            .collect();
        self.add_ignored(globals);
    }

    /// Substring markers (`:group:`) identifying unflushable groups inside
    /// a derived key, for exclusion during a selective flush.
    pub fn unflushable_markers(&self) -> Vec<String> {
        self.unflushable
            .read()
            .expect("policy lock poisoned")
            .iter()
            .map(|group| format!(":{group}:"))
            .collect()
    }
}
