//! # strata-core
//!
//! Core types for the Strata two-tier object cache: the dynamic value
//! model, the value codec, derived-key construction, the error taxonomy and
//! the cache event bus.
//!
//! This crate is backend-agnostic and engine-agnostic; the capability trait
//! for remote stores lives in `strata-backend`, and the two-tier engine in
//! `strata-cache`.
//!
//! ## Example
//!
//! ```
//! use strata_core::codec::{Codec, CodecMode};
//! use strata_core::keys::build_key;
//! use strata_core::value::CacheValue;
//!
//! let codec = Codec::new(CodecMode::Tagged);
//! let derived = build_key("alpha", "users", "s1", "");
//! assert_eq!(derived, "s1:users:alpha");
//!
//! let payload = codec.encode(&CacheValue::Int(42)).unwrap();
//! assert_eq!(codec.decode(&payload), CacheValue::Int(42));
//! ```

pub mod codec;
pub mod error;
pub mod events;
pub mod keys;
pub mod value;

pub use codec::{Codec, CodecMode, is_encoded};
pub use error::{CacheError, ErrorCategory};
pub use events::{CacheEvent, CacheEventKind, EventBroadcaster};
pub use keys::{DEFAULT_GROUP, build_key};
pub use value::CacheValue;

/// Type alias for a cache result.
pub type CacheResult<T> = Result<T, CacheError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use strata_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::codec::{Codec, CodecMode, is_encoded};
    pub use crate::error::{CacheError, ErrorCategory};
    pub use crate::events::{CacheEvent, CacheEventKind, EventBroadcaster};
    pub use crate::keys::{DEFAULT_GROUP, build_key};
    pub use crate::value::CacheValue;
    pub use crate::CacheResult;
}
