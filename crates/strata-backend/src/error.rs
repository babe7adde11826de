//! Transport error types for remote-tier connectors.

use strata_core::CacheError;

/// Errors raised by a backend connector.
///
/// Connectors perform no retries; every variant here reaches the engine as
/// a transport failure and is routed through its failure handler.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or the connection dropped.
    #[error("backend connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
    },

    /// A call did not complete within the connector's timeout.
    #[error("backend timeout: {message}")]
    Timeout {
        /// Description of the timed-out call.
        message: String,
    },

    /// The backend answered, but not with what the protocol expects.
    #[error("backend protocol error: {message}")]
    Protocol {
        /// Description of the protocol failure.
        message: String,
    },
}

impl BackendError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates a new `Protocol` error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Returns `true` if this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<BackendError> for CacheError {
    fn from(err: BackendError) -> Self {
        CacheError::transport(err.to_string())
    }
}
