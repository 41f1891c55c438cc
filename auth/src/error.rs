//! Error types for authentication-artifact operations.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Message shown to unauthenticated callers for every verification failure.
///
/// Not-found, mismatch, expiry and crypto failures all collapse into this one
/// string so the response cannot be used as an oracle for valid accounts.
pub const GENERIC_VERIFICATION_FAILURE: &str = "Invalid or expired code";

/// Comprehensive error taxonomy for the artifact lifecycle.
///
/// Internally every reason stays distinct so callers can make decisions
/// (for example whether the artifact was deleted). Externally, use
/// [`AuthError::public_message`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Verification Errors
    // ═══════════════════════════════════════════════════════════

    /// The encrypted subject identifier could not be decrypted.
    #[error("Invalid identifier")]
    InvalidIdentifier,

    /// No outstanding artifact for this subject and kind.
    #[error("Artifact not found")]
    ArtifactNotFound,

    /// The artifact existed but its expiry has passed; it has been deleted.
    #[error("Artifact has expired")]
    ArtifactExpired,

    /// The presented secret does not match the stored one.
    #[error("Artifact does not match")]
    ArtifactMismatch,

    // ═══════════════════════════════════════════════════════════
    // Request Errors
    // ═══════════════════════════════════════════════════════════

    /// Email address is malformed.
    #[error("Invalid email address")]
    InvalidEmail,

    // ═══════════════════════════════════════════════════════════
    // Rate Limiting
    // ═══════════════════════════════════════════════════════════

    /// Too many attempts from this address; retry after the given number of seconds.
    #[error("Too many attempts, please retry in {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds until the lockout ends
        retry_after_secs: u64,
    },

    // ═══════════════════════════════════════════════════════════
    // Crypto
    // ═══════════════════════════════════════════════════════════

    /// Encryption or decryption failed (malformed, short or tampered blob).
    #[error("Crypto failure: {0}")]
    CryptoFailure(String),

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Missing or invalid configuration (fatal at startup).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The TTL store failed.
    #[error("Store error: {0}")]
    StoreError(String),

    /// A stored record could not be (de)serialised.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Email delivery failed.
    #[error("Failed to send email")]
    EmailDeliveryFailed,

    /// Internal error (should not be exposed to users).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Returns `true` for the outcomes that must look identical to an
    /// unauthenticated caller.
    ///
    /// # Examples
    ///
    /// ```
    /// # use onetime_auth::AuthError;
    /// assert!(AuthError::ArtifactMismatch.is_verification_failure());
    /// assert!(AuthError::CryptoFailure("short blob".into()).is_verification_failure());
    /// assert!(!AuthError::EmailDeliveryFailed.is_verification_failure());
    /// ```
    #[must_use]
    pub const fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier
                | Self::ArtifactNotFound
                | Self::ArtifactExpired
                | Self::ArtifactMismatch
                | Self::CryptoFailure(_)
        )
    }

    /// Returns `true` if this error is due to invalid user input.
    ///
    /// # Examples
    ///
    /// ```
    /// # use onetime_auth::AuthError;
    /// assert!(AuthError::ArtifactMismatch.is_user_error());
    /// assert!(!AuthError::InternalError("boom".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier
                | Self::ArtifactNotFound
                | Self::ArtifactExpired
                | Self::ArtifactMismatch
                | Self::InvalidEmail
                | Self::RateLimited { .. }
        )
    }

    /// Returns `true` if this error indicates a security issue.
    ///
    /// # Examples
    ///
    /// ```
    /// # use onetime_auth::AuthError;
    /// assert!(AuthError::RateLimited { retry_after_secs: 30 }.is_security_issue());
    /// assert!(!AuthError::ArtifactExpired.is_security_issue());
    /// ```
    #[must_use]
    pub const fn is_security_issue(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier | Self::RateLimited { .. } | Self::CryptoFailure(_)
        )
    }

    /// Message safe to show an unauthenticated caller.
    ///
    /// Verification failures are indistinguishable; the rate-limit wait is
    /// reported because it is not secret; everything else is opaque.
    ///
    /// # Examples
    ///
    /// ```
    /// # use onetime_auth::AuthError;
    /// assert_eq!(
    ///     AuthError::ArtifactNotFound.public_message(),
    ///     AuthError::ArtifactMismatch.public_message(),
    /// );
    /// assert!(AuthError::RateLimited { retry_after_secs: 60 }
    ///     .public_message()
    ///     .contains("60"));
    /// ```
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            err if err.is_verification_failure() => GENERIC_VERIFICATION_FAILURE.to_string(),
            Self::RateLimited { .. } | Self::InvalidEmail => self.to_string(),
            Self::EmailDeliveryFailed => "We could not send the email, please try again".to_string(),
            _ => "Something went wrong, please try again".to_string(),
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        Self::StoreError(err.to_string())
    }
}
