//! Artifact issuance.
//!
//! # Flow
//!
//! ```text
//! issue(kind, subject, ttl)
//!   ├─ LoginCode / DeletionCode  → random code        → Code { code }
//!   ├─ EmailChangeCode           → random code        → VerificationLink { url, code }
//!   └─ MagicLinkToken            → random 16-byte tok → MagicLink { url }
//!        └─ store  artifact:{kind}:{subject}  (overwrites any previous one)
//! ```
//!
//! Links carry the subject id encrypted with the URL key, never the raw id.

use crate::artifact::{ArtifactKind, PresentedArtifact, StoredArtifact, SubjectId};
use crate::config::AuthConfig;
use crate::constants::{artifacts, urls};
use crate::crypto::CryptoBox;
use crate::error::{AuthError, Result};
use crate::providers::{TtlStore, ttl_from};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration;
use onetime_core::environment::Clock;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use std::sync::Arc;
use tracing::info;

/// Raw magic-link token length in bytes.
pub const TOKEN_BYTES: usize = 16;

const MAX_TOKEN_ATTEMPTS: usize = 8;

/// Issues login codes, magic links and confirmation codes.
#[derive(Clone)]
pub struct ArtifactIssuer<S> {
    store: S,
    crypto: Arc<CryptoBox>,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl<S: TtlStore> ArtifactIssuer<S> {
    /// Create an issuer.
    #[must_use]
    pub fn new(store: S, crypto: Arc<CryptoBox>, clock: Arc<dyn Clock>, config: AuthConfig) -> Self {
        Self {
            store,
            crypto,
            clock,
            config,
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Issue an artifact of `kind` for `subject_id`, valid for `ttl_minutes`.
    ///
    /// Any unconsumed artifact of the same kind for the same subject is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if `ttl_minutes` is outside
    /// `1..=MAX_TTL_MINUTES` (30 days), or a store / crypto error.
    pub async fn issue(
        &self,
        kind: ArtifactKind,
        subject_id: SubjectId,
        ttl_minutes: i64,
    ) -> Result<PresentedArtifact> {
        self.issue_with_payload(kind, subject_id, ttl_minutes, None).await
    }

    /// Issue with the configured TTL for `kind`.
    ///
    /// # Errors
    ///
    /// See [`ArtifactIssuer::issue`].
    pub async fn issue_default(
        &self,
        kind: ArtifactKind,
        subject_id: SubjectId,
        payload: Option<String>,
    ) -> Result<PresentedArtifact> {
        self.issue_with_payload(kind, subject_id, self.config.ttl_minutes(kind), payload)
            .await
    }

    /// Issue an artifact carrying an opaque `payload`, returned on verification.
    ///
    /// # Errors
    ///
    /// See [`ArtifactIssuer::issue`].
    pub async fn issue_with_payload(
        &self,
        kind: ArtifactKind,
        subject_id: SubjectId,
        ttl_minutes: i64,
        payload: Option<String>,
    ) -> Result<PresentedArtifact> {
        if !(1..=artifacts::MAX_TTL_MINUTES).contains(&ttl_minutes) {
            return Err(AuthError::Configuration(format!(
                "ttl_minutes must be between 1 and {}, got {ttl_minutes}",
                artifacts::MAX_TTL_MINUTES
            )));
        }

        let ttl = Duration::try_minutes(ttl_minutes).ok_or_else(|| {
            AuthError::Configuration(format!("ttl_minutes out of range: {ttl_minutes}"))
        })?;
        let store_ttl = ttl.checked_add(&self.config.store_grace).ok_or_else(|| {
            AuthError::Configuration("store_grace overflows the artifact lifetime".into())
        })?;
        let created_at = self.clock.now();
        let expires_at = created_at.checked_add_signed(ttl).ok_or_else(|| {
            AuthError::Configuration("artifact expiry is out of the representable range".into())
        })?;

        let secret = match kind {
            ArtifactKind::MagicLinkToken => generate_token()?,
            _ => self.generate_code(),
        };

        let presented = match kind {
            ArtifactKind::LoginCode | ArtifactKind::DeletionCode => PresentedArtifact::Code {
                code: secret.clone(),
                expires_at,
            },
            ArtifactKind::MagicLinkToken => PresentedArtifact::MagicLink {
                url: self.magic_link_url(&self.crypto.encrypt_user_id(subject_id)?, &secret)?,
                expires_at,
            },
            ArtifactKind::EmailChangeCode => PresentedArtifact::VerificationLink {
                url: self.verification_url(&self.crypto.encrypt_user_id(subject_id)?, &secret)?,
                code: secret.clone(),
                expires_at,
            },
        };

        let record = StoredArtifact {
            subject_id,
            kind,
            secret,
            payload,
            created_at,
            expires_at,
        };

        self.store
            .set(
                &kind.store_key(subject_id),
                serde_json::to_string(&record)?,
                ttl_from(store_ttl),
            )
            .await?;

        info!(
            subject_id = %subject_id,
            kind = %kind,
            expires_at = %expires_at,
            "Issued artifact"
        );

        Ok(presented)
    }

    /// Generate a code using the configured length and character set.
    #[must_use]
    pub fn generate_code(&self) -> String {
        let alphabet = self.config.code_charset.alphabet();
        let mut rng = rand::thread_rng();
        (0..self.config.effective_code_length())
            .map(|_| char::from(alphabet[rng.gen_range(0..alphabet.len())]))
            .collect()
    }

    /// `<base>/?action=magic_login&uid=<uid>&token=<token>`
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InternalError`] if the query cannot be encoded.
    pub fn magic_link_url(&self, uid: &str, token: &str) -> Result<String> {
        self.link(&[("action", urls::MAGIC_LOGIN_ACTION), ("uid", uid), ("token", token)])
    }

    /// `<base>/?action=verify_email&user_id=<uid>&code=<code>`
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InternalError`] if the query cannot be encoded.
    pub fn verification_url(&self, uid: &str, code: &str) -> Result<String> {
        self.link(&[
            ("action", urls::VERIFY_EMAIL_ACTION),
            ("user_id", uid),
            ("code", code),
        ])
    }

    fn link(&self, params: &[(&str, &str)]) -> Result<String> {
        let query = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::InternalError(format!("Failed to encode link: {e}")))?;
        Ok(format!("{}/?{query}", self.config.base_url.trim_end_matches('/')))
    }
}

impl<S> std::fmt::Debug for ArtifactIssuer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactIssuer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Generate a magic-link token: 16 random bytes as unpadded base64url.
///
/// # Errors
///
/// Returns [`AuthError::InternalError`] if no URL-safe token could be
/// produced, which the encoding makes unreachable in practice.
pub fn generate_token() -> Result<String> {
    for _ in 0..MAX_TOKEN_ATTEMPTS {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        if is_url_unreserved(&token) {
            return Ok(token);
        }
    }
    Err(AuthError::InternalError("could not generate a URL-safe token".into()))
}

/// RFC 3986 unreserved characters only: nothing that needs percent-encoding.
#[must_use]
pub fn is_url_unreserved(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~'))
}
