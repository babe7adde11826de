//! Backend failure handling.

use std::sync::atomic::Ordering;

use tracing::warn;

use strata_backend::BackendError;
use strata_core::{CacheEvent, CacheResult};

use crate::engine::StrataCache;

impl StrataCache {
    /// Reacts to a remote-tier failure: marks the instance disconnected,
    /// demotes global groups to local-only and publishes an error event.
    ///
    /// Graceful instances absorb the error (the caller then falls back to
    /// local behavior); non-graceful instances get it back as a transport
    /// error.
    pub(crate) fn handle_failure(&self, err: BackendError) -> CacheResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.policy.demote_globals();

        warn!(error = %err, "remote tier failure, degrading to local-only caching");
        self.events.send(CacheEvent::error(err.to_string()));

        if self.graceful { Ok(()) } else { Err(err.into()) }
    }
}
