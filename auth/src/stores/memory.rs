//! In-memory TTL store.
//!
//! Single-process store for tests and development. Expiry is evaluated
//! against an injected [`Clock`], so a manual clock moves keys past their TTL
//! the same way wall time does in Redis.
//!
//! Expired entries read as absent immediately and are dropped from the map
//! by an amortised purge on write: whenever the map reaches its high-water
//! mark every expired entry is removed and the mark is reset to twice the
//! live size (never below [`MIN_PURGE_THRESHOLD`]).

use crate::error::Result;
use crate::providers::TtlStore;
use chrono::{DateTime, Utc};
use onetime_core::environment::{Clock, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Map size below which writes never trigger a purge.
pub const MIN_PURGE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    purge_at: usize,
}

impl Entries {
    fn live_value(&mut self, key: &str, now: DateTime<Utc>) -> Option<String> {
        match self.map.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                self.map.remove(key);
                None
            }
            None => None,
        }
    }

    fn purge(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| entry.expires_at > now);
        self.purge_at = (self.map.len() * 2).max(MIN_PURGE_THRESHOLD);
        before - self.map.len()
    }

    fn insert(&mut self, key: &str, value: String, expires_at: DateTime<Utc>, now: DateTime<Utc>) {
        if !self.map.contains_key(key) && self.map.len() >= self.purge_at {
            let removed = self.purge(now);
            tracing::debug!(removed, live = self.map.len(), "Purged expired entries");
        }
        self.map.insert(key.to_string(), Entry { value, expires_at });
    }
}

/// In-memory [`TtlStore`] with clock-driven expiry.
///
/// Clones share the same map. `take`, `delete_if` and `set_if_absent` run
/// under the map lock, so concurrent callers on one key see exactly one winner.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a store that expires keys against wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that expires keys against `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries {
                map: HashMap::new(),
                purge_at: MIN_PURGE_THRESHOLD,
            })),
            clock,
        }
    }

    /// Number of live (unexpired) keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock().map.values().filter(|e| e.expires_at > now).count()
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries held in memory, expired ones included.
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.lock().map.len()
    }

    /// Drop every expired entry now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.lock().purge(now)
    }

    /// Live keys starting with `prefix`, sorted.
    #[must_use]
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .lock()
            .map
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.lock().map.len())
            .finish_non_exhaustive()
    }
}

impl TtlStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        Ok(self.lock().live_value(key, now))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let now = self.clock.now();
        let expires_at = Self::expiry(now, ttl);
        self.lock().insert(key, value, expires_at, now);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock().map.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let value = entries.live_value(key, now);
        entries.map.remove(key);
        Ok(value)
    }

    async fn delete_if(&self, key: &str, expected: &str) -> Result<bool> {
        let now = self.clock.now();
        let mut entries = self.lock();
        if entries.live_value(key, now).as_deref() == Some(expected) {
            entries.map.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let now = self.clock.now();
        let expires_at = Self::expiry(now, ttl);
        let mut entries = self.lock();
        if entries.live_value(key, now).is_some() {
            return Ok(false);
        }
        entries.insert(key, value, expires_at, now);
        Ok(true)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self.keys_with_prefix(prefix))
    }
}
