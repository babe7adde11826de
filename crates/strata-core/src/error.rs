//! Error types for the Strata object cache.
//!
//! This module defines the error taxonomy shared by every crate in the
//! workspace: transport failures surfaced by a backend connector, policy
//! violations (malformed call shapes) and codec failures.

use std::fmt;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The remote backend was unreachable, timed out or answered with a
    /// protocol error. Always routed through the failure handler at the
    /// engine boundary; in graceful mode the caller never observes it.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    /// The call shape was invalid (e.g. an empty batch request).
    /// Returned immediately, never routed through the failure handler.
    #[error("policy violation: {message}")]
    Policy {
        /// Description of why the call was rejected.
        message: String,
    },

    /// A value could not be encoded for the active codec mode.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },
}

impl CacheError {
    /// Creates a new `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a new `Policy` error.
    #[must_use]
    pub fn policy(message: impl Into<String>) -> Self {
        Self::Policy {
            message: message.into(),
        }
    }

    /// Creates a new `Codec` error.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a transport error.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Returns `true` if this is a policy violation.
    #[must_use]
    pub fn is_policy(&self) -> bool {
        matches!(self, Self::Policy { .. })
    }

    /// Returns `true` if this is a codec error.
    #[must_use]
    pub fn is_codec(&self) -> bool {
        matches!(self, Self::Codec { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } => ErrorCategory::Transport,
            Self::Policy { .. } => ErrorCategory::Policy,
            Self::Codec { .. } => ErrorCategory::Codec,
        }
    }
}

/// Categories of cache errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Backend unreachable, timeout or protocol error.
    Transport,
    /// Invalid call shape.
    Policy,
    /// Encode/decode failure.
    Codec,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Policy => write!(f, "policy"),
            Self::Codec => write!(f, "codec"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::transport("connection refused");
        assert_eq!(err.to_string(), "transport error: connection refused");

        let err = CacheError::policy("empty batch");
        assert_eq!(err.to_string(), "policy violation: empty batch");
    }

    #[test]
    fn test_error_predicates() {
        let err = CacheError::transport("down");
        assert!(err.is_transport());
        assert!(!err.is_policy());
        assert!(!err.is_codec());

        let err = CacheError::codec("bad payload");
        assert!(err.is_codec());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            CacheError::transport("down").category(),
            ErrorCategory::Transport
        );
        assert_eq!(
            CacheError::policy("bad input").category(),
            ErrorCategory::Policy
        );
        assert_eq!(ErrorCategory::Codec.to_string(), "codec");
    }
}
