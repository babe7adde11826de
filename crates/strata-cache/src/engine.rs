//! The two-tier cache engine.
//!
//! Every operation consults the local tier (an in-process map of decoded
//! values) and, for groups that participate in persistence, the remote
//! tier behind [`DynBackend`]. The local tier holds whatever this instance
//! has read or written; the remote tier is authoritative for contended
//! values such as counters.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::debug;

use strata_backend::DynBackend;
use strata_core::{CacheError, CacheEvent, CacheResult, CacheValue, Codec, EventBroadcaster, build_key};

use crate::config::CacheConfig;
use crate::policy::GroupPolicy;

/// Hook applied to values on their way out of [`StrataCache::get`] and
/// [`StrataCache::get_multi`]. Runs for found values only; misses are
/// returned as-is.
pub trait ValueFilter: Send + Sync {
    /// Transforms (or substitutes) a value before the caller sees it.
    fn filter(&self, value: CacheValue, key: &str, group: &str) -> CacheValue;
}

/// Point-in-time counters and connection state.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Reads served from either tier.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Entries currently held in the local tier.
    pub local_entries: usize,
    /// Whether the remote tier is still in use.
    pub connected: bool,
    /// Connector identifier (`"redis"`, `"memory"`, ...).
    pub backend_name: &'static str,
    /// Server version reported by the backend at connect time, if any.
    pub backend_version: Option<String>,
}

/// Builder for [`StrataCache`]. Construction ends with an async
/// [`connect`](StrataCacheBuilder::connect) that probes the backend.
pub struct StrataCacheBuilder {
    backend: DynBackend,
    config: CacheConfig,
    events: Option<EventBroadcaster>,
    value_filter: Option<Arc<dyn ValueFilter>>,
}

impl StrataCacheBuilder {
    fn new(backend: DynBackend) -> Self {
        Self {
            backend,
            config: CacheConfig::default(),
            events: None,
            value_filter: None,
        }
    }

    /// Replaces the default configuration.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Publishes cache events on an existing bus instead of a private one.
    pub fn events(mut self, events: EventBroadcaster) -> Self {
        self.events = Some(events);
        self
    }

    /// Installs a read-path value filter.
    pub fn value_filter(mut self, filter: Arc<dyn ValueFilter>) -> Self {
        self.value_filter = Some(filter);
        self
    }

    /// Probes the backend and returns the engine.
    ///
    /// On probe failure a graceful instance starts demoted (local-only);
    /// a non-graceful instance returns the transport error.
    pub async fn connect(self) -> CacheResult<StrataCache> {
        let config = self.config;
        let cache = StrataCache {
            backend: self.backend,
            codec: Codec::new(config.codec),
            local: DashMap::new(),
            policy: GroupPolicy::new(
                config.global_groups,
                config.ignored_groups,
                config.unflushable_groups,
            ),
            key_salt: config.key_salt,
            global_prefix: config.global_prefix,
            tenant_prefix: RwLock::new(config.tenant_prefix),
            max_ttl: config.max_ttl,
            graceful: config.graceful,
            selective_flush: config.selective_flush,
            connected: AtomicBool::new(false),
            backend_version: RwLock::new(None),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            additions_suspended: AtomicBool::new(false),
            events: self.events.unwrap_or_default(),
            value_filter: self.value_filter,
        };

        match cache.backend.ping().await {
            Ok(()) => {
                cache.connected.store(true, Ordering::SeqCst);
                match cache.backend.server_version().await {
                    Ok(version) => {
                        *cache
                            .backend_version
                            .write()
                            .expect("version lock poisoned") = version;
                    }
                    Err(err) => cache.handle_failure(err)?,
                }
            }
            Err(err) => cache.handle_failure(err)?,
        }

        Ok(cache)
    }
}

/// Two-tier object cache.
///
/// All methods take `&self`; the engine is safe to share behind an `Arc`
/// across tasks.
pub struct StrataCache {
    pub(crate) backend: DynBackend,
    codec: Codec,
    pub(crate) local: DashMap<String, CacheValue>,
    pub(crate) policy: GroupPolicy,
    pub(crate) key_salt: String,
    global_prefix: String,
    tenant_prefix: RwLock<String>,
    max_ttl: Option<u64>,
    pub(crate) graceful: bool,
    pub(crate) selective_flush: bool,
    pub(crate) connected: AtomicBool,
    backend_version: RwLock<Option<String>>,
    hits: AtomicU64,
    misses: AtomicU64,
    additions_suspended: AtomicBool,
    pub(crate) events: EventBroadcaster,
    value_filter: Option<Arc<dyn ValueFilter>>,
}

impl StrataCache {
    /// Starts building an engine over `backend`.
    pub fn builder(backend: DynBackend) -> StrataCacheBuilder {
        StrataCacheBuilder::new(backend)
    }

    /// Whether the remote tier is still in use. One-way: once an instance
    /// degrades it stays local-only for its lifetime.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// The event bus this engine publishes on.
    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Server version captured at connect time.
    pub fn backend_version(&self) -> Option<String> {
        self.backend_version
            .read()
            .expect("version lock poisoned")
            .clone()
    }

    /// Current counters and connection state.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            local_entries: self.local.len(),
            connected: self.is_connected(),
            backend_name: self.backend.backend_name(),
            backend_version: self.backend_version(),
        }
    }

    /// The full storage key for `key` in `group`: salt, then the global or
    /// tenant prefix depending on the group's classification, then the
    /// sanitized group and key.
    pub fn derive_key(&self, key: &str, group: &str) -> String {
        let prefix = if self.policy.is_global(group) {
            self.global_prefix.clone()
        } else {
            self.tenant_prefix
                .read()
                .expect("tenant lock poisoned")
                .clone()
        };
        build_key(key, group, &self.key_salt, &prefix)
    }

    /// Redirects non-global groups to a different tenant prefix. The local
    /// tier is left alone: entries under the old prefix simply stop being
    /// addressable and entries for global groups remain shared.
    pub fn switch_tenant(&self, prefix: impl Into<String>) {
        *self.tenant_prefix.write().expect("tenant lock poisoned") = prefix.into();
    }

    /// Registers groups whose keys use the global prefix. On a demoted
    /// instance the groups are registered as local-only instead, since
    /// nothing global can be shared without a backend.
    pub fn add_global_groups(&self, groups: impl IntoIterator<Item = impl Into<String>>) {
        let groups: Vec<String> = groups.into_iter().map(Into::into).collect();
        if self.is_connected() {
            self.policy.add_global(groups);
        } else {
            self.policy.add_ignored(groups);
        }
    }

    /// Registers groups that never reach the remote tier.
    pub fn add_non_persistent_groups(&self, groups: impl IntoIterator<Item = impl Into<String>>) {
        self.policy.add_ignored(groups.into_iter().map(Into::into));
    }

    /// Registers groups excluded from selective flushes.
    pub fn add_unflushable_groups(&self, groups: impl IntoIterator<Item = impl Into<String>>) {
        self.policy.add_unflushable(groups.into_iter().map(Into::into));
    }

    /// Makes [`add`](Self::add) report failure unconditionally until
    /// [`resume_additions`](Self::resume_additions). `set` and `replace`
    /// are unaffected.
    pub fn suspend_additions(&self) {
        self.additions_suspended.store(true, Ordering::SeqCst);
    }

    /// Lifts [`suspend_additions`](Self::suspend_additions).
    pub fn resume_additions(&self) {
        self.additions_suspended.store(false, Ordering::SeqCst);
    }

    fn participates(&self, group: &str) -> bool {
        !self.policy.is_ignored(group) && self.is_connected()
    }

    fn validate_expiration(&self, ttl_secs: u64) -> u64 {
        match self.max_ttl {
            Some(max) if ttl_secs == 0 || ttl_secs > max => max,
            _ => ttl_secs,
        }
    }

    fn apply_filter(&self, value: CacheValue, key: &str, group: &str) -> CacheValue {
        match &self.value_filter {
            Some(filter) => filter.filter(value, key, group),
            None => value,
        }
    }

    /// Stores `value` only if the key does not exist yet. Returns whether
    /// the store happened; existing entries are never modified.
    pub async fn add(
        &self,
        key: &str,
        value: CacheValue,
        group: &str,
        ttl_secs: u64,
    ) -> CacheResult<bool> {
        if self.additions_suspended.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.add_or_replace(true, key, value, group, ttl_secs).await
    }

    /// Stores `value` only if the key already exists. Returns whether the
    /// store happened; absent keys are not created.
    pub async fn replace(
        &self,
        key: &str,
        value: CacheValue,
        group: &str,
        ttl_secs: u64,
    ) -> CacheResult<bool> {
        self.add_or_replace(false, key, value, group, ttl_secs).await
    }

    async fn add_or_replace(
        &self,
        add: bool,
        key: &str,
        value: CacheValue,
        group: &str,
        ttl_secs: u64,
    ) -> CacheResult<bool> {
        let derived = self.derive_key(key, group);

        if !self.participates(group) {
            let exists = self.local.contains_key(&derived);
            if add == exists {
                return Ok(false);
            }
            self.local.insert(derived, value);
            return Ok(true);
        }

        // The remote tier decides existence; the local tier may be stale.
        let exists = match self.backend.exists(&derived).await {
            Ok(exists) => exists,
            Err(err) => {
                self.handle_failure(err)?;
                return Ok(false);
            }
        };
        if add == exists {
            return Ok(false);
        }

        let payload = self.codec.encode(&value)?;
        let ttl = self.validate_expiration(ttl_secs);
        match self.backend.set(&derived, &payload, ttl).await {
            Ok(true) => {
                self.local.insert(derived, value);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => {
                self.handle_failure(err)?;
                Ok(false)
            }
        }
    }

    /// Stores `value` unconditionally. `ttl_secs` of 0 means no expiry,
    /// subject to the configured `max_ttl` clamp.
    pub async fn set(
        &self,
        key: &str,
        value: CacheValue,
        group: &str,
        ttl_secs: u64,
    ) -> CacheResult<bool> {
        let start = Instant::now();
        let derived = self.derive_key(key, group);

        if self.participates(group) {
            let payload = self.codec.encode(&value)?;
            let ttl = self.validate_expiration(ttl_secs);
            match self.backend.set(&derived, &payload, ttl).await {
                Ok(true) => {}
                Ok(false) => {
                    self.events
                        .send(CacheEvent::set(key, group, false, start.elapsed()));
                    return Ok(false);
                }
                Err(err) => {
                    self.handle_failure(err)?;
                    self.events
                        .send(CacheEvent::set(key, group, false, start.elapsed()));
                    return Ok(false);
                }
            }
        }

        self.local.insert(derived, value);
        self.events
            .send(CacheEvent::set(key, group, true, start.elapsed()));
        Ok(true)
    }

    /// Reads a value. The local tier is consulted first unless `force` is
    /// set; remote hits are decoded and promoted into the local tier. A
    /// transport failure on a graceful instance reads as a miss.
    pub async fn get(&self, key: &str, group: &str, force: bool) -> CacheResult<Option<CacheValue>> {
        let start = Instant::now();
        let derived = self.derive_key(key, group);

        if !force {
            if let Some(entry) = self.local.get(&derived) {
                let value = entry.value().clone();
                drop(entry);
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %derived, "local tier hit");
                self.events
                    .send(CacheEvent::get(key, group, true, start.elapsed()));
                return Ok(Some(self.apply_filter(value, key, group)));
            }
        }

        if !self.participates(group) {
            self.misses.fetch_add(1, Ordering::Relaxed);
            self.events
                .send(CacheEvent::get(key, group, false, start.elapsed()));
            return Ok(None);
        }

        let fetched = match self.backend.get(&derived).await {
            Ok(fetched) => fetched,
            Err(err) => {
                self.handle_failure(err)?;
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.events
                    .send(CacheEvent::get(key, group, false, start.elapsed()));
                return Ok(None);
            }
        };

        match fetched {
            Some(bytes) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                let value = self.codec.decode(&bytes);
                self.local.insert(derived.clone(), value.clone());
                debug!(key = %derived, "remote tier hit");
                self.events
                    .send(CacheEvent::get(key, group, true, start.elapsed()));
                Ok(Some(self.apply_filter(value, key, group)))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %derived, "miss");
                self.events
                    .send(CacheEvent::get(key, group, false, start.elapsed()));
                Ok(None)
            }
        }
    }

    /// Batch read across groups. The result maps each *derived* key to its
    /// value (or `None`), preserving request order; participating groups
    /// are fetched with one `MGET` per group.
    ///
    /// # Errors
    ///
    /// Returns a policy error when `requests` is empty.
    pub async fn get_multi(
        &self,
        requests: &IndexMap<String, Vec<String>>,
    ) -> CacheResult<IndexMap<String, Option<CacheValue>>> {
        if requests.is_empty() {
            return Err(CacheError::policy("get_multi requires at least one group"));
        }

        let mut results = IndexMap::new();

        for (group, keys) in requests {
            if !self.participates(group) {
                for key in keys {
                    let derived = self.derive_key(key, group);
                    let value = self.get(key, group, false).await?;
                    results.insert(derived, value);
                }
                continue;
            }

            let derived: Vec<String> =
                keys.iter().map(|key| self.derive_key(key, group)).collect();
            let fetched = match self.backend.mget(&derived).await {
                Ok(fetched) => fetched,
                Err(err) => {
                    self.handle_failure(err)?;
                    vec![None; derived.len()]
                }
            };

            for ((key, derived_key), slot) in
                keys.iter().zip(derived.into_iter()).zip(fetched)
            {
                match slot {
                    Some(bytes) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        let value = self.codec.decode(&bytes);
                        self.local.insert(derived_key.clone(), value.clone());
                        results.insert(derived_key, Some(self.apply_filter(value, key, group)));
                    }
                    None => {
                        self.misses.fetch_add(1, Ordering::Relaxed);
                        results.insert(derived_key, None);
                    }
                }
            }
        }

        Ok(results)
    }

    /// Removes a key from both tiers. Returns `true` when either tier
    /// actually removed something; deleting an absent key is a `false`,
    /// not an error.
    pub async fn delete(&self, key: &str, group: &str) -> CacheResult<bool> {
        let start = Instant::now();
        let derived = self.derive_key(key, group);

        let mut removed = self.local.remove(&derived).is_some();

        if self.participates(group) {
            match self.backend.delete(&derived).await {
                Ok(remote_removed) => removed = removed || remote_removed,
                Err(err) => {
                    self.handle_failure(err)?;
                    self.events
                        .send(CacheEvent::delete(key, group, false, start.elapsed()));
                    return Ok(false);
                }
            }
        }

        self.events
            .send(CacheEvent::delete(key, group, removed, start.elapsed()));
        Ok(removed)
    }

    /// Atomically adds `offset` to a numeric entry, treating a missing
    /// entry as 0. Returns the new value.
    pub async fn increment(&self, key: &str, offset: i64, group: &str) -> CacheResult<i64> {
        self.apply_offset(key, offset, group, false).await
    }

    /// Atomically subtracts `offset` from a numeric entry, treating a
    /// missing entry as 0. Returns the new value.
    pub async fn decrement(&self, key: &str, offset: i64, group: &str) -> CacheResult<i64> {
        self.apply_offset(key, offset, group, true).await
    }

    async fn apply_offset(
        &self,
        key: &str,
        offset: i64,
        group: &str,
        negate: bool,
    ) -> CacheResult<i64> {
        let derived = self.derive_key(key, group);
        let signed = if negate { -offset } else { offset };

        if !self.participates(group) {
            return Ok(self.adjust_local(&derived, signed));
        }

        let adjusted = if negate {
            self.backend.decr_by(&derived, offset).await
        } else {
            self.backend.incr_by(&derived, offset).await
        };

        match adjusted {
            Ok(value) => {
                // Mirror the backend's counter into the local tier; the
                // re-read wins over our arithmetic result under contention.
                match self.backend.get(&derived).await {
                    Ok(Some(bytes)) => {
                        let authoritative =
                            self.codec.decode(&bytes).as_i64().unwrap_or(value);
                        self.local.insert(derived, CacheValue::Int(authoritative));
                    }
                    Ok(None) => {
                        self.local.insert(derived, CacheValue::Int(value));
                    }
                    Err(err) => {
                        self.handle_failure(err)?;
                        self.local.insert(derived, CacheValue::Int(value));
                    }
                }
                Ok(value)
            }
            Err(err) => {
                self.handle_failure(err)?;
                Ok(self.adjust_local(&derived, signed))
            }
        }
    }

    fn adjust_local(&self, derived: &str, delta: i64) -> i64 {
        let current = self
            .local
            .get(derived)
            .and_then(|entry| entry.value().as_i64())
            .unwrap_or(0);
        let next = current.saturating_add(delta);
        self.local.insert(derived.to_string(), CacheValue::Int(next));
        next
    }
}
