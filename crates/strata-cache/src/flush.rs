//! Cache flushing.
//!
//! Selective flushes run a static Lua script once per master node. The
//! script is parameterized, never built from runtime strings: the match
//! pattern is `ARGV[1]`, the salt length (a 1-based search offset for
//! marker matching) is `ARGV[2]` and the unflushable-group markers are
//! the script's `KEYS`.

use std::time::{Duration, Instant};

use tracing::debug;

use strata_backend::{BackendResult, NodeId};
use strata_core::{CacheEvent, CacheResult};

use crate::engine::StrataCache;

/// Deletes every key matching the `ARGV[1]` pattern, returning the
/// deletion count.
pub(crate) const FLUSH_SCRIPT: &str = r"
local cursor = 0
local deleted = 0
repeat
    local reply = redis.call('SCAN', cursor, 'MATCH', ARGV[1], 'COUNT', 1000)
    cursor = tonumber(reply[1])
    for _, key in ipairs(reply[2]) do
        redis.call('DEL', key)
        deleted = deleted + 1
    end
until cursor == 0
return deleted
";

/// Same as [`FLUSH_SCRIPT`], but keys containing any `KEYS` marker at or
/// past the `ARGV[2]` offset are kept.
pub(crate) const FLUSH_EXCLUDING_SCRIPT: &str = r"
local cursor = 0
local deleted = 0
local from = tonumber(ARGV[2])
repeat
    local reply = redis.call('SCAN', cursor, 'MATCH', ARGV[1], 'COUNT', 1000)
    cursor = tonumber(reply[1])
    for _, key in ipairs(reply[2]) do
        local keep = false
        for _, marker in ipairs(KEYS) do
            if string.find(key, marker, from, true) then
                keep = true
                break
            end
        end
        if not keep then
            redis.call('DEL', key)
            deleted = deleted + 1
        end
    end
until cursor == 0
return deleted
";

impl StrataCache {
    /// Empties the cache, optionally after sleeping for `delay`.
    ///
    /// The local tier is cleared unconditionally before any remote work;
    /// a half-flushed remote with a warm local tier would serve deleted
    /// values. On a connected instance the remote step then runs once per
    /// master node: a selective delete of salted keys when selective
    /// flushing is enabled, a node-wide flush otherwise. The first node
    /// failure aborts the loop through the usual degradation path.
    ///
    /// Returns `true` only when every node reported a truthy result; a
    /// demoted instance always reports `false`.
    pub async fn flush(&self, delay: Option<Duration>) -> CacheResult<bool> {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let start = Instant::now();

        self.local.clear();

        if !self.is_connected() {
            self.events.send(CacheEvent::flush(false, start.elapsed()));
            return Ok(false);
        }

        let nodes = match self.backend.master_nodes().await {
            Ok(nodes) => nodes,
            Err(err) => {
                self.handle_failure(err)?;
                self.events.send(CacheEvent::flush(false, start.elapsed()));
                return Ok(false);
            }
        };

        let selective = self.selective_flush && !self.key_salt.is_empty();
        let mut results = Vec::with_capacity(nodes.len());

        for node in &nodes {
            let outcome = if selective {
                self.flush_node_selective(node).await
            } else {
                self.backend.flush_node(Some(node)).await
            };
            match outcome {
                Ok(ok) => results.push(ok),
                Err(err) => {
                    self.handle_failure(err)?;
                    self.events.send(CacheEvent::flush(false, start.elapsed()));
                    return Ok(false);
                }
            }
        }

        let ok = !results.is_empty() && results.iter().all(|ok| *ok);
        self.events.send(CacheEvent::flush(ok, start.elapsed()));
        Ok(ok)
    }

    async fn flush_node_selective(&self, node: &NodeId) -> BackendResult<bool> {
        let markers = self.policy.unflushable_markers();
        let script = if markers.is_empty() {
            FLUSH_SCRIPT
        } else {
            FLUSH_EXCLUDING_SCRIPT
        };
        let args = vec![
            format!("{}*", self.key_salt),
            self.key_salt.len().to_string(),
        ];

        let deleted = self.backend.eval(script, &markers, &args, Some(node)).await?;
        debug!(node = %node, deleted, "selective flush finished on node");
        // The script reply is a deletion count; zero is falsy.
        Ok(deleted != 0)
    }
}
