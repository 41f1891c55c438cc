//! Redis-based TTL store implementation.
//!
//! # Architecture
//!
//! Every key is namespaced as `{prefix}:{key}` and written with `SETEX`, so
//! Redis evicts artifacts, attempt windows and lockouts on its own.
//! Single-use consumption uses `GETDEL`, compare-and-delete runs as a Lua
//! script and conditional restores use `SET NX`, so each is atomic across any
//! number of application processes sharing the instance. `scan_prefix` walks
//! the keyspace with `SCAN`, never `KEYS`.
//!
//! # Example
//!
//! ```no_run
//! use onetime_auth::stores::RedisStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::new("redis://127.0.0.1:6379", "onetime").await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::providers::TtlStore;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 500;

/// Delete `KEYS[1]` only while it still holds `ARGV[1]`.
const DELETE_IF_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// `Redis`-backed [`TtlStore`].
///
/// This type is `Clone`; clones share the same `ConnectionManager`.
#[derive(Clone)]
pub struct RedisStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,

    /// Key namespace.
    prefix: String,
}

impl RedisStore {
    /// Connect to `Redis`.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - `Redis` connection URL (e.g., "<redis://127.0.0.1:6379>")
    /// * `prefix` - Namespace prepended to every key
    ///
    /// # Errors
    ///
    /// Returns error if the URL is malformed or the connection fails.
    pub async fn new(redis_url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AuthError::StoreError(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            AuthError::StoreError(format!("Failed to create Redis connection manager: {e}"))
        })?;

        let prefix = prefix.into();
        tracing::info!(prefix = %prefix, "RedisStore initialized successfully");

        Ok(Self {
            conn_manager,
            prefix,
        })
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}:{key}", self.prefix)
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl TtlStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<String> = conn.get(self.namespaced(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let ttl_seconds = ttl.as_secs().max(1);

        let _: () = conn.set_ex(self.namespaced(key), value, ttl_seconds).await?;

        tracing::trace!(key = key, ttl_seconds = ttl_seconds, "Stored key in Redis");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn.del(self.namespaced(key)).await?;
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        // GETDEL: get + delete in one command, so only one caller can win.
        let value: Option<String> = conn.get_del(self.namespaced(key)).await?;
        Ok(value)
    }

    async fn delete_if(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let removed: i64 = redis::Script::new(DELETE_IF_SCRIPT)
            .key(self.namespaced(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let written: Option<String> = redis::cmd("SET")
            .arg(self.namespaced(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(written.is_some())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let namespace = self.namespaced("");
        let pattern = format!("{namespace}{prefix}*");
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            found.extend(
                batch
                    .into_iter()
                    .filter_map(|key| key.strip_prefix(&namespace).map(str::to_string)),
            );

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        found.sort();
        found.dedup();
        Ok(found)
    }
}
