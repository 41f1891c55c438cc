//! Authentication configuration.
//!
//! This module provides configuration structures for the issuer, verifier and
//! rate limiter. Configuration values should be provided by the application,
//! not hardcoded; every field has a sensible default.

use crate::artifact::ArtifactKind;
use crate::constants::{artifacts, limits};
use crate::error::{AuthError, Result};
use crate::rate_limit::ActionClass;
use chrono::Duration;
use std::fmt;
use zeroize::Zeroizing;

/// Character set used for emailed codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodeCharset {
    /// Digits only (`0-9`).
    #[default]
    Numeric,

    /// Upper-case letters and digits without look-alikes (`0 O 1 I L`).
    Alphanumeric,
}

impl CodeCharset {
    /// The symbols a code is drawn from.
    #[must_use]
    pub const fn alphabet(self) -> &'static [u8] {
        match self {
            Self::Numeric => b"0123456789",
            Self::Alphanumeric => b"ABCDEFGHJKMNPQRSTUVWXYZ23456789",
        }
    }
}

/// Artifact issuance configuration.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL for magic links and verification links (e.g., "https://app.example.com").
    ///
    /// Links are formatted as `{base_url}/?action=...`.
    pub base_url: String,

    /// Length of emailed codes.
    ///
    /// Default: 6, clamped to `4..=12`.
    pub code_length: usize,

    /// Symbols used for emailed codes.
    pub code_charset: CodeCharset,

    /// Login code time-to-live in minutes.
    ///
    /// Default: 15 minutes
    pub login_code_ttl_minutes: i64,

    /// Magic link time-to-live in minutes.
    ///
    /// Default: 15 minutes
    pub magic_link_ttl_minutes: i64,

    /// Account deletion code time-to-live in minutes.
    ///
    /// Default: 15 minutes
    pub deletion_code_ttl_minutes: i64,

    /// Email change code time-to-live in minutes.
    ///
    /// Default: 60 minutes
    pub email_change_ttl_minutes: i64,

    /// Extra lifetime given to store entries beyond the artifact's own expiry.
    ///
    /// Expiry is decided by comparing `expires_at` with the clock, so the
    /// store must still hold the record briefly after it lapses for the
    /// verifier to report (and delete) it as expired.
    ///
    /// Default: 60 seconds
    pub store_grace: Duration,
}

impl AuthConfig {
    /// Create new configuration.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL for your application (e.g., "https://app.example.com")
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set code length.
    #[must_use]
    pub const fn with_code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    /// Set code character set.
    #[must_use]
    pub const fn with_code_charset(mut self, charset: CodeCharset) -> Self {
        self.code_charset = charset;
        self
    }

    /// Set login code time-to-live.
    #[must_use]
    pub const fn with_login_code_ttl(mut self, minutes: i64) -> Self {
        self.login_code_ttl_minutes = minutes;
        self
    }

    /// Set magic link time-to-live.
    #[must_use]
    pub const fn with_magic_link_ttl(mut self, minutes: i64) -> Self {
        self.magic_link_ttl_minutes = minutes;
        self
    }

    /// Set deletion code time-to-live.
    #[must_use]
    pub const fn with_deletion_code_ttl(mut self, minutes: i64) -> Self {
        self.deletion_code_ttl_minutes = minutes;
        self
    }

    /// Set email change code time-to-live.
    #[must_use]
    pub const fn with_email_change_ttl(mut self, minutes: i64) -> Self {
        self.email_change_ttl_minutes = minutes;
        self
    }

    /// Set store grace period.
    #[must_use]
    pub const fn with_store_grace(mut self, grace: Duration) -> Self {
        self.store_grace = grace;
        self
    }

    /// Configured time-to-live for an artifact kind, in minutes.
    #[must_use]
    pub const fn ttl_minutes(&self, kind: ArtifactKind) -> i64 {
        match kind {
            ArtifactKind::LoginCode => self.login_code_ttl_minutes,
            ArtifactKind::MagicLinkToken => self.magic_link_ttl_minutes,
            ArtifactKind::DeletionCode => self.deletion_code_ttl_minutes,
            ArtifactKind::EmailChangeCode => self.email_change_ttl_minutes,
        }
    }

    /// Code length after clamping to the supported range.
    #[must_use]
    pub fn effective_code_length(&self) -> usize {
        self.code_length.clamp(4, 12)
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the base URL is empty, any TTL
    /// is outside `1..=MAX_TTL_MINUTES`, or the store grace is negative or
    /// longer than a day.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(AuthError::Configuration("base_url must not be empty".into()));
        }

        let ttls = [
            self.login_code_ttl_minutes,
            self.magic_link_ttl_minutes,
            self.deletion_code_ttl_minutes,
            self.email_change_ttl_minutes,
        ];
        if ttls
            .iter()
            .any(|ttl| !(1..=artifacts::MAX_TTL_MINUTES).contains(ttl))
        {
            return Err(AuthError::Configuration(format!(
                "artifact TTLs must be between 1 and {} minutes",
                artifacts::MAX_TTL_MINUTES
            )));
        }

        if self.store_grace < Duration::zero()
            || self.store_grace > Duration::seconds(artifacts::MAX_STORE_GRACE_SECS)
        {
            return Err(AuthError::Configuration(format!(
                "store_grace must be between 0 and {} seconds",
                artifacts::MAX_STORE_GRACE_SECS
            )));
        }

        Ok(())
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            code_length: 6,
            code_charset: CodeCharset::Numeric,
            login_code_ttl_minutes: 15,
            magic_link_ttl_minutes: 15,
            deletion_code_ttl_minutes: 15,
            email_change_ttl_minutes: 60,
            store_grace: Duration::seconds(60),
        }
    }
}

/// Rate limiting and lockout configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Login-code / magic-link requests allowed per IP.
    pub max_login_requests: u32,

    /// Code / link verifications allowed per IP.
    pub max_login_verifications: u32,

    /// Registrations allowed per IP.
    pub max_registrations: u32,

    /// Inactivity after which an attempt window is forgotten.
    ///
    /// Default: 15 minutes
    pub attempt_window: Duration,

    /// How long an IP stays blocked once a threshold is reached.
    ///
    /// Default: 30 minutes
    pub lockout_duration: Duration,

    /// Minimum time between two opportunistic sweeps.
    ///
    /// Default: 1 hour
    pub sweep_interval: Duration,
}

impl RateLimitConfig {
    /// Attempt threshold for an action class.
    #[must_use]
    pub const fn threshold(&self, class: ActionClass) -> u32 {
        match class {
            ActionClass::LoginRequest => self.max_login_requests,
            ActionClass::LoginVerify => self.max_login_verifications,
            ActionClass::Registration => self.max_registrations,
        }
    }

    /// Set login request threshold.
    #[must_use]
    pub const fn with_max_login_requests(mut self, max: u32) -> Self {
        self.max_login_requests = max;
        self
    }

    /// Set verification threshold.
    #[must_use]
    pub const fn with_max_login_verifications(mut self, max: u32) -> Self {
        self.max_login_verifications = max;
        self
    }

    /// Set registration threshold.
    #[must_use]
    pub const fn with_max_registrations(mut self, max: u32) -> Self {
        self.max_registrations = max;
        self
    }

    /// Set attempt window.
    #[must_use]
    pub const fn with_attempt_window(mut self, window: Duration) -> Self {
        self.attempt_window = window;
        self
    }

    /// Set lockout duration.
    #[must_use]
    pub const fn with_lockout_duration(mut self, duration: Duration) -> Self {
        self.lockout_duration = duration;
        self
    }

    /// Set sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Validate configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if a threshold is zero or a
    /// duration is not positive or longer than seven days.
    pub fn validate(&self) -> Result<()> {
        if self.max_login_requests == 0
            || self.max_login_verifications == 0
            || self.max_registrations == 0
        {
            return Err(AuthError::Configuration(
                "rate limit thresholds must be greater than 0".into(),
            ));
        }
        let max = Duration::seconds(limits::MAX_DURATION_SECS);
        let durations = [
            ("attempt_window", self.attempt_window),
            ("lockout_duration", self.lockout_duration),
            ("sweep_interval", self.sweep_interval),
        ];
        for (name, value) in durations {
            if value <= Duration::zero() || value > max {
                return Err(AuthError::Configuration(format!(
                    "{name} must be between 1 second and {} seconds",
                    limits::MAX_DURATION_SECS
                )));
            }
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_login_requests: limits::MAX_LOGIN_REQUESTS,
            max_login_verifications: limits::MAX_LOGIN_VERIFICATIONS,
            max_registrations: limits::MAX_REGISTRATIONS,
            attempt_window: Duration::seconds(limits::ATTEMPT_WINDOW_SECS),
            lockout_duration: Duration::seconds(limits::LOCKOUT_DURATION_SECS),
            sweep_interval: Duration::seconds(limits::SWEEP_INTERVAL_SECS),
        }
    }
}

/// Environment variables holding the long-term secret material.
pub const SECRET_ENV_VARS: [&str; 4] = [
    "ONETIME_AUTH_SALT",
    "ONETIME_STORAGE_SALT",
    "ONETIME_URL_SALT",
    "ONETIME_NONCE_SALT",
];

/// Long-term, site-level secret material.
///
/// Four independent secrets. Each derived key is salted with a disjoint pair,
/// so compromising one secret never yields both keys. Buffers are wiped on
/// drop.
#[derive(Clone)]
pub struct SiteSecrets {
    pub(crate) auth_salt: Zeroizing<String>,
    pub(crate) storage_salt: Zeroizing<String>,
    pub(crate) url_salt: Zeroizing<String>,
    pub(crate) nonce_salt: Zeroizing<String>,
}

impl SiteSecrets {
    /// Build from explicit values.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if any secret is empty.
    pub fn new(
        auth_salt: impl Into<String>,
        storage_salt: impl Into<String>,
        url_salt: impl Into<String>,
        nonce_salt: impl Into<String>,
    ) -> Result<Self> {
        let secrets = Self {
            auth_salt: Zeroizing::new(auth_salt.into()),
            storage_salt: Zeroizing::new(storage_salt.into()),
            url_salt: Zeroizing::new(url_salt.into()),
            nonce_salt: Zeroizing::new(nonce_salt.into()),
        };

        let values = [
            &secrets.auth_salt,
            &secrets.storage_salt,
            &secrets.url_salt,
            &secrets.nonce_salt,
        ];
        for (name, value) in SECRET_ENV_VARS.iter().zip(values) {
            if value.is_empty() {
                return Err(AuthError::Configuration(format!("secret {name} is empty")));
            }
        }

        Ok(secrets)
    }

    /// Read the secrets through a lookup function (environment, vault, test map).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] naming the first missing or empty
    /// secret.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |name: &str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| AuthError::Configuration(format!("missing secret {name}")))
        };

        Self::new(
            fetch(SECRET_ENV_VARS[0])?,
            fetch(SECRET_ENV_VARS[1])?,
            fetch(SECRET_ENV_VARS[2])?,
            fetch(SECRET_ENV_VARS[3])?,
        )
    }

    /// Read the secrets from the process environment ([`SECRET_ENV_VARS`]).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if any variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }
}

impl fmt::Debug for SiteSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiteSecrets").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_auth_config_builder() {
        let config = AuthConfig::new("https://example.com")
            .with_code_length(8)
            .with_code_charset(CodeCharset::Alphanumeric)
            .with_login_code_ttl(5)
            .with_email_change_ttl(120);

        assert_eq!(config.base_url, "https://example.com");
        assert_eq!(config.effective_code_length(), 8);
        assert_eq!(config.code_charset, CodeCharset::Alphanumeric);
        assert_eq!(config.ttl_minutes(ArtifactKind::LoginCode), 5);
        assert_eq!(config.ttl_minutes(ArtifactKind::EmailChangeCode), 120);
        assert_eq!(config.ttl_minutes(ArtifactKind::MagicLinkToken), 15);
    }

    #[test]
    fn test_code_length_is_clamped() {
        assert_eq!(AuthConfig::default().with_code_length(1).effective_code_length(), 4);
        assert_eq!(AuthConfig::default().with_code_length(64).effective_code_length(), 12);
    }

    #[test]
    fn test_alphanumeric_alphabet_has_no_lookalikes() {
        let alphabet = CodeCharset::Alphanumeric.alphabet();
        for ambiguous in b"0O1IL" {
            assert!(!alphabet.contains(ambiguous));
        }
    }

    #[test]
    fn test_auth_config_validation() {
        assert!(AuthConfig::default().validate().is_ok());
        assert!(AuthConfig::new("").validate().is_err());
        assert!(AuthConfig::default().with_magic_link_ttl(0).validate().is_err());
    }

    #[test]
    fn test_auth_config_rejects_huge_values() {
        let ttl = AuthConfig::default().with_login_code_ttl(i64::MAX / 60);
        assert!(matches!(ttl.validate(), Err(AuthError::Configuration(_))));

        let longest = AuthConfig::default().with_email_change_ttl(artifacts::MAX_TTL_MINUTES);
        assert!(longest.validate().is_ok());

        let grace = AuthConfig::default().with_store_grace(Duration::days(365));
        assert!(matches!(grace.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_rate_limit_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.threshold(ActionClass::LoginRequest), 3);
        assert_eq!(config.threshold(ActionClass::LoginVerify), 5);
        assert_eq!(config.threshold(ActionClass::Registration), 3);
        assert_eq!(config.attempt_window, Duration::seconds(900));
        assert_eq!(config.lockout_duration, Duration::seconds(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_validation_rejects_zero_threshold() {
        let config = RateLimitConfig::default().with_max_registrations(0);
        assert!(matches!(config.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_rate_limit_validation_bounds_durations() {
        let huge = RateLimitConfig::default().with_lockout_duration(Duration::MAX);
        assert!(matches!(huge.validate(), Err(AuthError::Configuration(_))));

        let week = RateLimitConfig::default().with_attempt_window(Duration::days(7));
        assert!(week.validate().is_ok());

        let sweep = RateLimitConfig::default().with_sweep_interval(Duration::zero());
        assert!(matches!(sweep.validate(), Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_site_secrets_from_lookup() {
        let values: HashMap<&str, &str> = SECRET_ENV_VARS
            .iter()
            .map(|name| (*name, "some-long-random-value"))
            .collect();

        let secrets = SiteSecrets::from_lookup(|name| values.get(name).map(ToString::to_string));
        assert!(secrets.is_ok());
    }

    #[test]
    fn test_site_secrets_missing_is_configuration_error() {
        let result = SiteSecrets::from_lookup(|name| {
            (name != "ONETIME_URL_SALT").then(|| "value".to_string())
        });

        match result {
            Err(AuthError::Configuration(message)) => assert!(message.contains("ONETIME_URL_SALT")),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_site_secrets_debug_redacts() {
        let secrets = SiteSecrets::new("a-secret", "b-secret", "c-secret", "d-secret");
        let rendered = format!("{:?}", secrets.map_err(|e| e.to_string()));
        assert!(!rendered.contains("a-secret"));
    }
}
