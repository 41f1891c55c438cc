//! TTL key-value store trait.
//!
//! This is the only persistence capability the artifact engine relies on.
//! Artifacts, attempt windows and lockout records all live here, so the
//! engine itself holds no long-lived in-process state and any number of
//! request-handling processes can share one store.

use crate::error::Result;
use std::time::Duration;

/// Key-value store with per-key expiry.
///
/// # Implementation Notes
///
/// - Values are opaque strings (the engine stores JSON)
/// - `set` overwrites any previous value and resets its TTL
/// - Expired keys must read as absent
/// - `delete` of a missing key is not an error
///
/// # Atomicity
///
/// `take`, `delete_if` and `set_if_absent` guard single-use consumption
/// against concurrent reissue. Their default implementations are two separate
/// calls; stores that can do better (Redis `GETDEL` and scripts, a
/// mutex-guarded map) should override them so a racing writer is never
/// clobbered.
pub trait TtlStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send;

    /// Write a value that expires after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Remove a value.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn delete(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Read and remove a value.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn take(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>>> + Send {
        async move {
            let value = self.get(key).await?;
            if value.is_some() {
                self.delete(key).await?;
            }
            Ok(value)
        }
    }

    /// Remove `key` only if it still holds `expected`. Returns whether it was removed.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn delete_if(
        &self,
        key: &str,
        expected: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send {
        async move {
            if self.get(key).await?.as_deref() == Some(expected) {
                self.delete(key).await?;
                return Ok(true);
            }
            Ok(false)
        }
    }

    /// Write `value` only if `key` is absent. Returns whether it was written.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<bool>> + Send {
        async move {
            if self.get(key).await?.is_some() {
                return Ok(false);
            }
            self.set(key, value, ttl).await?;
            Ok(true)
        }
    }

    /// List live keys starting with `prefix`.
    ///
    /// Used by maintenance sweeps, never on the request path.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store fails.
    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}

/// Convert a `chrono` duration into a store TTL, clamped to at least one second.
#[must_use]
pub fn ttl_from(duration: chrono::Duration) -> Duration {
    duration
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(Duration::from_secs(1))
}
