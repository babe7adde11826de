//! The remote-tier capability trait.
//!
//! This module defines the contract every remote store connector must
//! implement. The engine only ever talks to `dyn KvBackend`; topology
//! (single node, replicated, sentinel, clustered) is the connector's
//! concern and surfaces here only through [`KvBackend::master_nodes`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Type alias for a backend result.
pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a single master node of the remote store.
///
/// Non-clustered topologies report exactly one node; the identifier is
/// opaque to the engine and only ever handed back to the same connector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node handle from an opaque identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The capability interface over a remote key-value store.
///
/// Implementations must be thread-safe (`Send + Sync`). Every method may
/// fail with a [`BackendError`]; connectors perform no retries — retry and
/// backoff policy, if any, lives outside this trait.
///
/// # Example
///
/// ```ignore
/// use strata_backend::{DynBackend, BackendError};
///
/// async fn probe(backend: &DynBackend) -> Result<(), BackendError> {
///     backend.ping().await
/// }
/// ```
#[async_trait]
pub trait KvBackend: Send + Sync {
    // ==================== Single-key operations ====================

    /// Reads the raw bytes stored under `key`.
    ///
    /// Returns `None` if the key does not exist; errors are reserved for
    /// transport failures.
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Reads several keys in one round-trip.
    ///
    /// The result is aligned with the input order: position `i` holds the
    /// value (or `None`) for `keys[i]`.
    async fn mget(&self, keys: &[String]) -> BackendResult<Vec<Option<Vec<u8>>>>;

    /// Stores `value` under `key`.
    ///
    /// `ttl_secs == 0` means no expiry. Returns whether the store accepted
    /// the write.
    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> BackendResult<bool>;

    /// Returns whether `key` currently exists.
    async fn exists(&self, key: &str) -> BackendResult<bool>;

    /// Deletes `key`. Returns whether a key was actually removed.
    async fn delete(&self, key: &str) -> BackendResult<bool>;

    // ==================== Counters ====================

    /// Atomically adds `delta` to the integer at `key` (creating it at 0)
    /// and returns the post-operation value.
    async fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64>;

    /// Atomically subtracts `delta` from the integer at `key` and returns
    /// the post-operation value.
    async fn decr_by(&self, key: &str, delta: i64) -> BackendResult<i64>;

    // ==================== Health and topology ====================

    /// Round-trip liveness check.
    async fn ping(&self) -> BackendResult<()>;

    /// Version string reported by the store, if it reports one.
    async fn server_version(&self) -> BackendResult<Option<String>>;

    /// Enumerates the master nodes of the store.
    ///
    /// Single-element for non-clustered topologies. Scripted and flush
    /// operations are issued once per master.
    async fn master_nodes(&self) -> BackendResult<Vec<NodeId>>;

    // ==================== Scripted operations ====================

    /// Evaluates a server-side script and returns its integer result.
    ///
    /// The script runs atomically from the store's perspective. `node`
    /// selects the master to run on; `None` means the connector's default.
    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
        node: Option<&NodeId>,
    ) -> BackendResult<i64>;

    /// Wipes the active keyspace of one master node (`None` for the
    /// connector's default). Returns whether the wipe was acknowledged.
    async fn flush_node(&self, node: Option<&NodeId>) -> BackendResult<bool>;

    // ==================== Metadata ====================

    /// Name of this connector for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// Type alias for a shared backend trait object.
pub type DynBackend = std::sync::Arc<dyn KvBackend>;
