//! # strata-backend-memory
//!
//! In-process implementation of the Strata backend trait.
//!
//! Backed by a `DashMap` with lazy per-key expiry. Used as the test double
//! for the engine and as the remote tier in single-process deployments
//! where no shared store is available.
//!
//! Two deliberate deviations from a networked store:
//!
//! - [`MemoryBackend::eval`] cannot run Lua. It implements the
//!   selective-flush call shape natively (match pattern in `ARGV[1]`, salt
//!   length in `ARGV[2]`, exclusion markers in `KEYS`), which is the only
//!   script the engine ever issues.
//! - [`MemoryBackend::set_failing`] injects transport failures so that
//!   degradation paths can be exercised without a real outage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use strata_backend::{BackendError, BackendResult, KvBackend, NodeId};

struct StoredEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn new(data: Vec<u8>, ttl_secs: u64) -> Self {
        let expires_at = if ttl_secs == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(ttl_secs))
        };
        Self { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-process key-value backend.
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredEntry>,
    failing: AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects (or clears) a transport fault: while failing, every
    /// operation returns a connection error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .count()
    }

    /// Returns `true` when no live entries remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the live key set, for assertions in tests.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn check_fault(&self) -> BackendResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(BackendError::connection("injected failure"))
        } else {
            Ok(())
        }
    }

    fn live(&self, key: &str) -> Option<Vec<u8>> {
        match self.entries.get(key) {
            Some(entry) if !entry.value().is_expired() => Some(entry.value().data.clone()),
            Some(entry) => {
                drop(entry);
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        self.check_fault()?;
        Ok(self.live(key))
    }

    async fn mget(&self, keys: &[String]) -> BackendResult<Vec<Option<Vec<u8>>>> {
        self.check_fault()?;
        Ok(keys.iter().map(|key| self.live(key)).collect())
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> BackendResult<bool> {
        self.check_fault()?;
        self.entries
            .insert(key.to_string(), StoredEntry::new(value.to_vec(), ttl_secs));
        Ok(true)
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        self.check_fault()?;
        Ok(self.live(key).is_some())
    }

    async fn delete(&self, key: &str) -> BackendResult<bool> {
        self.check_fault()?;
        Ok(match self.entries.remove(key) {
            Some((_, entry)) => !entry.is_expired(),
            None => false,
        })
    }

    async fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64> {
        self.check_fault()?;
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| StoredEntry::new(b"0".to_vec(), 0));

        let current: i64 = std::str::from_utf8(&entry.data)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| BackendError::protocol("value is not an integer"))?;

        let next = current.saturating_add(delta);
        entry.data = next.to_string().into_bytes();
        Ok(next)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> BackendResult<i64> {
        self.incr_by(key, -delta).await
    }

    async fn ping(&self) -> BackendResult<()> {
        self.check_fault()
    }

    async fn server_version(&self) -> BackendResult<Option<String>> {
        self.check_fault()?;
        Ok(None)
    }

    async fn master_nodes(&self) -> BackendResult<Vec<NodeId>> {
        self.check_fault()?;
        Ok(vec![NodeId::new("memory")])
    }

    /// Native stand-in for the selective-flush script: deletes every live
    /// key matching the `ARGV[1]` prefix pattern unless it contains one of
    /// the `KEYS` markers past the `ARGV[2]` salt offset, and returns the
    /// deletion count.
    async fn eval(
        &self,
        _script: &str,
        keys: &[String],
        args: &[String],
        _node: Option<&NodeId>,
    ) -> BackendResult<i64> {
        self.check_fault()?;

        let pattern = args
            .first()
            .ok_or_else(|| BackendError::protocol("eval requires a match pattern argument"))?;
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let search_from = args
            .get(1)
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(0)
            .saturating_sub(1);

        let matching: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();

        let mut deleted = 0;
        for key in matching {
            let tail = key.get(search_from..).unwrap_or("");
            let excluded = keys.iter().any(|marker| tail.contains(marker.as_str()));
            if !excluded && self.entries.remove(&key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn flush_node(&self, _node: Option<&NodeId>) -> BackendResult<bool> {
        self.check_fault()?;
        self.entries.clear();
        Ok(true)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
