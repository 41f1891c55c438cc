//! Authentication constants.
//!
//! Defaults and wire-level names used throughout the crate. Every tunable
//! value here has a matching builder method in [`crate::config`].

/// Rate-limiting defaults.
pub mod limits {
    /// Login-code / magic-link requests allowed per IP before lockout.
    pub const MAX_LOGIN_REQUESTS: u32 = 3;

    /// Code / link verifications allowed per IP before lockout.
    pub const MAX_LOGIN_VERIFICATIONS: u32 = 5;

    /// Registrations allowed per IP before lockout.
    pub const MAX_REGISTRATIONS: u32 = 3;

    /// Seconds an attempt window lives after its last write.
    pub const ATTEMPT_WINDOW_SECS: i64 = 900;

    /// Seconds an IP stays blocked once a threshold is reached.
    pub const LOCKOUT_DURATION_SECS: i64 = 1800;

    /// Minimum seconds between two opportunistic sweeps.
    pub const SWEEP_INTERVAL_SECS: i64 = 3600;

    /// Upper bound for any configured window, lockout or sweep interval (7 days).
    pub const MAX_DURATION_SECS: i64 = 7 * 24 * 3600;
}

/// Artifact lifetime bounds.
pub mod artifacts {
    /// Longest accepted artifact lifetime in minutes (30 days).
    pub const MAX_TTL_MINUTES: i64 = 30 * 24 * 60;

    /// Longest accepted store grace period in seconds (1 day).
    pub const MAX_STORE_GRACE_SECS: i64 = 24 * 3600;
}

/// Key-derivation parameters.
pub mod kdf {
    /// PBKDF2-HMAC-SHA256 iteration count.
    pub const PBKDF2_ROUNDS: u32 = 10_000;

    /// Derived key length in bytes (AES-256).
    pub const KEY_LEN: usize = 32;
}

/// Magic-link and verification URL shape.
pub mod urls {
    /// `action` value for magic-link sign in.
    pub const MAGIC_LOGIN_ACTION: &str = "magic_login";

    /// `action` value for email verification.
    pub const VERIFY_EMAIL_ACTION: &str = "verify_email";
}

/// Key namespaces inside the TTL store.
pub mod keys {
    /// Prefix for stored artifacts: `artifact:{kind}:{subject_id}`.
    pub const ARTIFACT: &str = "artifact";

    /// Prefix for attempt windows: `attempts:{class}:{ip}`.
    pub const ATTEMPT_WINDOW: &str = "attempts";

    /// Prefix for lockout records: `lockout:{class}:{ip}`.
    pub const LOCKOUT: &str = "lockout";

    /// Timestamp of the last completed sweep.
    pub const LAST_SWEEP: &str = "ratelimit:last_sweep";
}
