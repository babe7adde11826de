//! # strata-cache
//!
//! The Strata two-tier cache engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                 StrataCache                  │
//! │                                              │
//! │  local tier            remote tier           │
//! │  ┌───────────────┐     ┌──────────────────┐  │
//! │  │ DashMap of    │     │ DynBackend       │  │
//! │  │ decoded       │ ──► │ (redis, memory)  │  │
//! │  │ CacheValue    │     │ encoded payloads │  │
//! │  └───────────────┘     └──────────────────┘  │
//! │                                              │
//! │  GroupPolicy: global / ignored / unflushable │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Reads consult the local tier first and promote remote hits into it.
//! Writes go remote-first for participating groups, local-only for ignored
//! groups or a demoted instance. Backend failures on a graceful instance
//! permanently demote it to local-only operation; the demotion also folds
//! global groups into the ignored set so cross-tenant data is never served
//! stale from one process.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_backend_memory::MemoryBackend;
//! use strata_cache::{CacheConfig, StrataCache};
//! use strata_core::CacheValue;
//!
//! # async fn run() -> strata_core::CacheResult<()> {
//! let backend = Arc::new(MemoryBackend::new());
//! let cache = StrataCache::builder(backend)
//!     .config(CacheConfig::default())
//!     .connect()
//!     .await?;
//!
//! cache.set("alpha", CacheValue::from("hello"), "default", 60).await?;
//! let value = cache.get("alpha", "default", false).await?;
//! assert_eq!(value, Some(CacheValue::from("hello")));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
mod failure;
mod flush;
pub mod policy;

pub use config::CacheConfig;
pub use engine::{CacheStats, StrataCache, StrataCacheBuilder, ValueFilter};
pub use policy::GroupPolicy;

// Re-exported so engine callers rarely need strata-core directly.
pub use strata_core::{
    CacheError, CacheEvent, CacheEventKind, CacheResult, CacheValue, CodecMode, EventBroadcaster,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::CacheConfig;
    pub use crate::engine::{CacheStats, StrataCache, StrataCacheBuilder, ValueFilter};
    pub use crate::policy::GroupPolicy;
    pub use strata_core::prelude::*;
}
