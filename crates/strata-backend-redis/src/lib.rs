//! # strata-backend-redis
//!
//! Redis connector for the Strata object cache.
//!
//! A thin adapter over a `deadpool-redis` pool: one pool, one node. The
//! pool owns connection and read timeouts; this crate performs no retries.
//! Sharded/sentinel/clustered topologies live in their own connectors
//! behind the same `KvBackend` trait and are out of scope here — for this
//! connector, [`KvBackend::master_nodes`] reports the single node it is
//! connected to.

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;

use strata_backend::{BackendError, BackendResult, KvBackend, NodeId};

/// Redis-backed implementation of the remote tier.
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Wraps an existing connection pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds a pool from a Redis URL (`redis://host:port/db`).
    ///
    /// # Errors
    ///
    /// Returns a connection error when the pool cannot be created; actual
    /// connectivity is only probed on first use (or via [`KvBackend::ping`]).
    pub fn from_url(url: &str) -> BackendResult<Self> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| BackendError::connection(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> BackendResult<Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| BackendError::connection(e.to_string()))
    }
}

fn map_redis_error(err: redis::RedisError) -> BackendError {
    if err.is_timeout() {
        BackendError::timeout(err.to_string())
    } else if err.is_connection_refusal() || err.is_io_error() {
        BackendError::connection(err.to_string())
    } else {
        BackendError::protocol(err.to_string())
    }
}

/// Extracts `redis_version` from an `INFO server` reply.
fn parse_server_version(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.strip_prefix("redis_version:"))
        .map(|version| version.trim().to_string())
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(map_redis_error)
    }

    async fn mget(&self, keys: &[String]) -> BackendResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;
        conn.mget(keys).await.map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: u64) -> BackendResult<bool> {
        let mut conn = self.conn().await?;
        if ttl_secs > 0 {
            conn.set_ex::<_, _, ()>(key, value, ttl_secs)
                .await
                .map_err(map_redis_error)?;
        } else {
            conn.set::<_, _, ()>(key, value)
                .await
                .map_err(map_redis_error)?;
        }
        Ok(true)
    }

    async fn exists(&self, key: &str) -> BackendResult<bool> {
        let mut conn = self.conn().await?;
        conn.exists(key).await.map_err(map_redis_error)
    }

    async fn delete(&self, key: &str) -> BackendResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(key).await.map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64> {
        let mut conn = self.conn().await?;
        conn.incr(key, delta).await.map_err(map_redis_error)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> BackendResult<i64> {
        let mut conn = self.conn().await?;
        conn.decr(key, delta).await.map_err(map_redis_error)
    }

    async fn ping(&self) -> BackendResult<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn server_version(&self) -> BackendResult<Option<String>> {
        let mut conn = self.conn().await?;
        let info: String = redis::cmd("INFO")
            .arg("server")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(parse_server_version(&info))
    }

    async fn master_nodes(&self) -> BackendResult<Vec<NodeId>> {
        Ok(vec![NodeId::new("primary")])
    }

    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
        node: Option<&NodeId>,
    ) -> BackendResult<i64> {
        // Single-node connector: every node handle resolves to the pool.
        if let Some(node) = node {
            tracing::debug!(node = %node, "eval routed to single-node pool");
        }
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("EVAL");
        cmd.arg(script).arg(keys.len());
        for key in keys {
            cmd.arg(key);
        }
        for arg in args {
            cmd.arg(arg);
        }
        cmd.query_async(&mut conn).await.map_err(map_redis_error)
    }

    async fn flush_node(&self, _node: Option<&NodeId>) -> BackendResult<bool> {
        let mut conn = self.conn().await?;
        let reply: String = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(reply == "OK")
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
