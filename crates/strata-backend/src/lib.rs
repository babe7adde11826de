//! # strata-backend
//!
//! Remote-tier abstraction for the Strata object cache.
//!
//! This crate defines the capability trait ([`KvBackend`]) and transport
//! error type every remote store connector must implement. It does not
//! contain any implementations — those are provided by separate crates
//! (`strata-backend-memory`, `strata-backend-redis`).
//!
//! ## Overview
//!
//! The engine requires a connected backend with get/mget/set/delete,
//! atomic counters, a liveness probe, and per-master-node script
//! evaluation for selective flush. Everything topology-specific stays
//! behind the trait.

mod error;
mod traits;

pub use error::BackendError;
pub use traits::{BackendResult, DynBackend, KvBackend, NodeId};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use strata_backend::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::BackendError;
    pub use crate::traits::{BackendResult, DynBackend, KvBackend, NodeId};
}
