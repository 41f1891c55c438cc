//! Per-IP attempt counting and timed lockout.
//!
//! # Model
//!
//! For every `(ip, action class)` the limiter keeps an [`AttemptWindow`] in
//! the TTL store. Each recorded attempt increments the window's counter; once
//! the counter reaches the class threshold a [`LockoutRecord`] is written and
//! the window is dropped. While the lockout is live every call for that
//! `(ip, class)` is answered with the remaining seconds and nothing is counted.
//!
//! ```text
//! attempts:{class}:{ip}  -> AttemptWindow   TTL = attempt_window, re-set on each write
//! lockout:{class}:{ip}   -> LockoutRecord   TTL = lockout_duration
//! ratelimit:last_sweep   -> timestamp
//! ```
//!
//! The request path touches only the keys of its own `(ip, class)`. There is
//! no shared index: `sweep()` enumerates windows and lockouts through
//! [`TtlStore::scan_prefix`], so its cost is paid once per `sweep_interval`.
//!
//! `window_start` is written once and never moved. Because the store TTL is
//! re-set on every write, a window survives as long as attempts keep arriving
//! less than `attempt_window` apart; it is a fixed window that continued
//! traffic can extend, not a sliding one.
//!
//! # Concurrency
//!
//! Window updates are read-modify-write with no compare-and-swap. Two
//! simultaneous requests from one address can under-count by one. Only the
//! abuse counter is affected; artifact verification never depends on it.

use crate::config::RateLimitConfig;
use crate::constants::keys;
use crate::error::{AuthError, Result};
use crate::providers::{TtlStore, ttl_from};
use crate::utils::normalize_identifier;
use chrono::{DateTime, Duration, Utc};
use onetime_core::environment::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Category of attempt. Each class is counted and locked out independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    /// Requesting a login code or magic link.
    LoginRequest,

    /// Presenting a login code or magic link.
    LoginVerify,

    /// Creating an account.
    Registration,
}

impl ActionClass {
    /// All classes, in declaration order.
    pub const ALL: [Self; 3] = [Self::LoginRequest, Self::LoginVerify, Self::Registration];

    /// Stable name used in store keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginRequest => "login_request",
            Self::LoginVerify => "login_verify",
            Self::Registration => "registration",
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempts from one address for one action class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptWindow {
    /// Attempts recorded in this window.
    pub count: u32,

    /// When the first attempt of this window happened.
    pub window_start: DateTime<Utc>,

    /// Attempts per normalised identifier (email).
    #[serde(default)]
    pub per_identifier_counts: HashMap<String, u32>,
}

impl AttemptWindow {
    fn open(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
            per_identifier_counts: HashMap::new(),
        }
    }
}

/// A live block on one address for one action class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutRecord {
    /// First instant at which attempts are accepted again.
    pub blocked_until: DateTime<Utc>,
}

/// Outcome of [`RateLimiter::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The attempt was counted and may proceed.
    Allowed,

    /// The address is locked out.
    Blocked {
        /// Seconds until the lockout ends (rounded up, at least 1).
        seconds_remaining: u64,
    },
}

impl RateLimitDecision {
    /// Whether the attempt may proceed.
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Convert into a `Result`, mapping `Blocked` to [`AuthError::RateLimited`].
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RateLimited`] when blocked.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Allowed => Ok(()),
            Self::Blocked { seconds_remaining } => Err(AuthError::RateLimited {
                retry_after_secs: seconds_remaining,
            }),
        }
    }
}

/// What a [`RateLimiter::sweep`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Attempt windows older than the attempt window.
    pub windows_removed: usize,

    /// Lockouts whose `blocked_until` has passed.
    pub lockouts_removed: usize,

    /// Windows and lockouts still live after the sweep.
    pub retained: usize,
}

/// Attempt counter and lockout guard over a [`TtlStore`].
///
/// Holds no state of its own; clones and separate processes sharing one
/// store see the same windows and lockouts.
#[derive(Clone)]
pub struct RateLimiter<S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl<S: TtlStore> RateLimiter<S> {
    /// Create a rate limiter.
    #[must_use]
    pub fn new(store: S, clock: Arc<dyn Clock>, config: RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check the lockout for `(ip, class)` and, if not blocked, count one attempt.
    ///
    /// # Behavior
    ///
    /// 1. A live lockout answers `Blocked` without counting.
    /// 2. A lapsed lockout is deleted and the call proceeds.
    /// 3. The attempt is added to the window (and to `identifier`'s sub-count).
    /// 4. If the count reaches the class threshold, a lockout of
    ///    `lockout_duration` is created, the window is dropped and the call
    ///    answers `Blocked` with the full duration.
    ///
    /// A sweep runs first if the last one is older than `sweep_interval`.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails or a stored record is corrupt.
    pub async fn check_and_record(
        &self,
        ip: IpAddr,
        class: ActionClass,
        identifier: &str,
    ) -> Result<RateLimitDecision> {
        let now = self.clock.now();
        self.maybe_sweep(now).await;

        if let Some(seconds_remaining) = self.live_lockout(ip, class, now).await? {
            warn!(ip = %ip, action = %class, seconds_remaining, "Blocked attempt from locked-out address");
            return Ok(RateLimitDecision::Blocked { seconds_remaining });
        }

        let window_key = Self::window_key(ip, class);
        let mut window = match self.store.get(&window_key).await? {
            Some(raw) => serde_json::from_str::<AttemptWindow>(&raw)?,
            None => AttemptWindow::open(now),
        };

        window.count = window.count.saturating_add(1);
        let identifier = normalize_identifier(identifier);
        if !identifier.is_empty() {
            let sub = window.per_identifier_counts.entry(identifier).or_insert(0);
            *sub = sub.saturating_add(1);
        }

        let threshold = self.config.threshold(class);
        if window.count >= threshold {
            return self.lock_out(ip, class, now, window.count).await;
        }

        self.store
            .set(
                &window_key,
                serde_json::to_string(&window)?,
                ttl_from(self.config.attempt_window),
            )
            .await?;

        debug!(ip = %ip, action = %class, count = window.count, threshold, "Recorded attempt");
        Ok(RateLimitDecision::Allowed)
    }

    /// Forget the attempt window for `(ip, class)` after a successful authentication.
    ///
    /// Other classes, other addresses and any live lockout are untouched.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    pub async fn clear(&self, ip: IpAddr, class: ActionClass) -> Result<()> {
        self.store.delete(&Self::window_key(ip, class)).await?;
        debug!(ip = %ip, action = %class, "Cleared attempt window");
        Ok(())
    }

    /// Seconds left on a live lockout for `(ip, class)`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails or the record is corrupt.
    pub async fn lockout_remaining(&self, ip: IpAddr, class: ActionClass) -> Result<Option<u64>> {
        let now = self.clock.now();
        let Some(raw) = self.store.get(&Self::lockout_key(ip, class)).await? else {
            return Ok(None);
        };
        let record: LockoutRecord = serde_json::from_str(&raw)?;
        Ok((record.blocked_until > now).then(|| seconds_until(now, record.blocked_until)))
    }

    /// Current attempt window for `(ip, class)`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails or the record is corrupt.
    pub async fn attempts(&self, ip: IpAddr, class: ActionClass) -> Result<Option<AttemptWindow>> {
        match self.store.get(&Self::window_key(ip, class)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Delete stale windows and lapsed lockouts.
    ///
    /// A window is stale once `now - window_start` exceeds `attempt_window`;
    /// a lockout once `blocked_until <= now`. Unreadable records are logged
    /// and removed. A record rewritten by a concurrent request between the
    /// read and the delete is kept.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for key in self.store.scan_prefix(&format!("{}:", keys::LOCKOUT)).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let stale = match serde_json::from_str::<LockoutRecord>(&raw) {
                Ok(record) => record.blocked_until <= now,
                Err(e) => {
                    warn!(key = %key, error = %e, "Removing unreadable lockout record");
                    true
                }
            };

            if stale && self.store.delete_if(&key, &raw).await? {
                report.lockouts_removed += 1;
            } else {
                report.retained += 1;
            }
        }

        for key in self.store.scan_prefix(&format!("{}:", keys::ATTEMPT_WINDOW)).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let stale = match serde_json::from_str::<AttemptWindow>(&raw) {
                Ok(window) => now - window.window_start > self.config.attempt_window,
                Err(e) => {
                    warn!(key = %key, error = %e, "Removing unreadable attempt window");
                    true
                }
            };

            if stale && self.store.delete_if(&key, &raw).await? {
                report.windows_removed += 1;
            } else {
                report.retained += 1;
            }
        }

        self.store
            .set(
                keys::LAST_SWEEP,
                serde_json::to_string(&now)?,
                ttl_from(self.config.sweep_interval),
            )
            .await?;

        info!(
            windows_removed = report.windows_removed,
            lockouts_removed = report.lockouts_removed,
            retained = report.retained,
            "Rate limit sweep complete"
        );
        Ok(report)
    }

    /// Time of the last completed sweep, if it is still recorded.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails or the record is corrupt.
    pub async fn last_sweep(&self) -> Result<Option<DateTime<Utc>>> {
        match self.store.get(keys::LAST_SWEEP).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn maybe_sweep(&self, now: DateTime<Utc>) {
        let due = match self.last_sweep().await {
            Ok(Some(last)) => now - last >= self.config.sweep_interval,
            Ok(None) => true,
            Err(e) => {
                warn!(error = %e, "Could not read last sweep time");
                false
            }
        };

        if due {
            if let Err(e) = self.sweep().await {
                warn!(error = %e, "Opportunistic rate limit sweep failed");
            }
        }
    }

    async fn live_lockout(
        &self,
        ip: IpAddr,
        class: ActionClass,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>> {
        let key = Self::lockout_key(ip, class);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };

        let record: LockoutRecord = serde_json::from_str(&raw)?;
        if record.blocked_until > now {
            return Ok(Some(seconds_until(now, record.blocked_until)));
        }

        self.store.delete(&key).await?;
        debug!(ip = %ip, action = %class, "Removed lapsed lockout");
        Ok(None)
    }

    async fn lock_out(
        &self,
        ip: IpAddr,
        class: ActionClass,
        now: DateTime<Utc>,
        count: u32,
    ) -> Result<RateLimitDecision> {
        let duration = self.config.lockout_duration;
        let blocked_until = now.checked_add_signed(duration).ok_or_else(|| {
            AuthError::Configuration("lockout_duration is out of the representable range".into())
        })?;
        let record = LockoutRecord { blocked_until };
        let lockout_key = Self::lockout_key(ip, class);

        self.store
            .set(&lockout_key, serde_json::to_string(&record)?, ttl_from(duration))
            .await?;
        self.store.delete(&Self::window_key(ip, class)).await?;

        let seconds_remaining = seconds_until(now, record.blocked_until);
        warn!(
            ip = %ip,
            action = %class,
            attempts = count,
            blocked_until = %record.blocked_until,
            "Address locked out"
        );
        Ok(RateLimitDecision::Blocked { seconds_remaining })
    }

    fn window_key(ip: IpAddr, class: ActionClass) -> String {
        format!("{}:{}:{ip}", keys::ATTEMPT_WINDOW, class.as_str())
    }

    fn lockout_key(ip: IpAddr, class: ActionClass) -> String {
        format!("{}:{}:{ip}", keys::LOCKOUT, class.as_str())
    }
}

impl<S> fmt::Debug for RateLimiter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Whole seconds from `now` until `until`, rounded up, at least 1.
fn seconds_until(now: DateTime<Utc>, until: DateTime<Utc>) -> u64 {
    let millis = (until - now).num_milliseconds().max(0);
    u64::try_from((millis + 999) / 1000).unwrap_or(0).max(1)
}
