//! Cache event notifications.
//!
//! The engine publishes one event per get/set/delete/flush and one per
//! transport error on a broadcast bus. Publishing is fire-and-forget: send
//! errors (no subscribers) are ignored, nothing is awaited, and subscribers
//! can never affect an operation's return value.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::broadcast;

/// Default buffer size for the broadcast channel.
/// Slow receivers drop the oldest events past this limit.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Kind of cache event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEventKind {
    /// A read was served (hit or miss).
    Get,
    /// A value was written.
    Set,
    /// A key was deleted.
    Delete,
    /// The cache was flushed.
    Flush,
    /// A transport error was handled.
    Error,
}

impl CacheEventKind {
    /// Returns the string representation of the event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheEventKind::Get => "get",
            CacheEventKind::Set => "set",
            CacheEventKind::Delete => "delete",
            CacheEventKind::Flush => "flush",
            CacheEventKind::Error => "error",
        }
    }
}

impl std::fmt::Display for CacheEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single cache event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEvent {
    /// What happened.
    pub kind: CacheEventKind,
    /// Raw key the operation addressed, if key-scoped.
    pub key: Option<String>,
    /// Group the operation addressed, if key-scoped.
    pub group: Option<String>,
    /// Operation outcome: hit/success true, miss/failure false.
    pub ok: bool,
    /// Error description for `Error` events.
    pub message: Option<String>,
    /// Wall-clock time the operation took.
    pub elapsed: Duration,
    /// Timestamp of the event.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    fn new(kind: CacheEventKind, ok: bool, elapsed: Duration) -> Self {
        Self {
            kind,
            key: None,
            group: None,
            ok,
            message: None,
            elapsed,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Create a `Get` event.
    pub fn get(key: impl Into<String>, group: impl Into<String>, hit: bool, elapsed: Duration) -> Self {
        Self::new(CacheEventKind::Get, hit, elapsed).with_target(key, group)
    }

    /// Create a `Set` event.
    pub fn set(key: impl Into<String>, group: impl Into<String>, ok: bool, elapsed: Duration) -> Self {
        Self::new(CacheEventKind::Set, ok, elapsed).with_target(key, group)
    }

    /// Create a `Delete` event.
    pub fn delete(
        key: impl Into<String>,
        group: impl Into<String>,
        ok: bool,
        elapsed: Duration,
    ) -> Self {
        Self::new(CacheEventKind::Delete, ok, elapsed).with_target(key, group)
    }

    /// Create a `Flush` event.
    pub fn flush(ok: bool, elapsed: Duration) -> Self {
        Self::new(CacheEventKind::Flush, ok, elapsed)
    }

    /// Create an `Error` event.
    pub fn error(message: impl Into<String>) -> Self {
        let mut event = Self::new(CacheEventKind::Error, false, Duration::ZERO);
        event.message = Some(message.into());
        event
    }

    fn with_target(mut self, key: impl Into<String>, group: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self.group = Some(group.into());
        self
    }
}

/// Broadcaster for cache events.
///
/// Thread-safe, cheap to clone, multi-consumer. A broadcaster with no
/// subscribers silently drops events.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with the default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with a custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event; 0 when
    /// there are none. Never blocks and never fails.
    pub fn send(&self, event: CacheEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
