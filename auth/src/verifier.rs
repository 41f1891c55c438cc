//! Artifact verification and single-use consumption.
//!
//! # State machine
//!
//! ```text
//!            issue                 verify (match)
//!   ∅ ───────────────▶ Issued ─────────────────────▶ Consumed
//!                      │  ▲  │
//!        verify        │  │  │ verify after expires_at
//!       (mismatch)     └──┘  └───────────────────────▶ Expired (deleted)
//!                        │
//!                        └── reissue ──▶ Invalidated (overwritten)
//! ```
//!
//! A mismatch leaves the artifact in place so the user can retry until it
//! expires or the rate limiter steps in.
//!
//! Every write the verifier makes is conditional on what it read. An expired
//! artifact is removed only while it is still the record that was read, and
//! an artifact taken by mistake is put back only into an empty slot, so a
//! reissue that lands mid-verification always survives.

use crate::artifact::{ArtifactKind, StoredArtifact, SubjectId, SubjectRef, VerifiedArtifact};
use crate::crypto::CryptoBox;
use crate::error::{AuthError, Result};
use crate::providers::{TtlStore, ttl_from};
use constant_time_eq::constant_time_eq;
use onetime_core::environment::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Validates presented codes and tokens against stored artifacts.
#[derive(Clone)]
pub struct ArtifactVerifier<S> {
    store: S,
    crypto: Arc<CryptoBox>,
    clock: Arc<dyn Clock>,
}

impl<S: TtlStore> ArtifactVerifier<S> {
    /// Create a verifier.
    #[must_use]
    pub fn new(store: S, crypto: Arc<CryptoBox>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            crypto,
            clock,
        }
    }

    /// Verify `presented` against the stored artifact of `kind` and consume it.
    ///
    /// # Steps
    ///
    /// 1. Decrypt an encrypted subject reference; failure is terminal and
    ///    nothing is read from the store.
    /// 2. Look the artifact up.
    /// 3. If it has expired, delete it unless it was replaced meanwhile.
    /// 4. Compare the full secret; on mismatch keep it.
    /// 5. On match, take it from the store (exactly one concurrent caller wins).
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidIdentifier`]: encrypted subject did not decrypt
    /// - [`AuthError::ArtifactNotFound`]: nothing outstanding (or already consumed)
    /// - [`AuthError::ArtifactExpired`]: past `expires_at`; the artifact is deleted
    /// - [`AuthError::ArtifactMismatch`]: wrong secret; the artifact is kept
    /// - store and serialization errors
    pub async fn verify(
        &self,
        kind: ArtifactKind,
        subject: &SubjectRef,
        presented: &str,
    ) -> Result<VerifiedArtifact> {
        let subject_id = self.resolve_subject(subject)?;
        let key = kind.store_key(subject_id);

        let Some(raw) = self.store.get(&key).await? else {
            debug!(subject_id = %subject_id, kind = %kind, "No outstanding artifact");
            return Err(AuthError::ArtifactNotFound);
        };
        let record: StoredArtifact = serde_json::from_str(&raw)?;

        let now = self.clock.now();
        if record.is_expired_at(now) {
            if !self.store.delete_if(&key, &raw).await? {
                debug!(subject_id = %subject_id, kind = %kind, "Expired artifact already replaced");
            }
            warn!(subject_id = %subject_id, kind = %kind, expired_at = %record.expires_at, "Artifact expired");
            return Err(AuthError::ArtifactExpired);
        }

        if !secrets_match(presented, &record.secret) {
            warn!(subject_id = %subject_id, kind = %kind, "Artifact mismatch");
            return Err(AuthError::ArtifactMismatch);
        }

        // Between get and take another request may have consumed or replaced it.
        let Some(taken_raw) = self.store.take(&key).await? else {
            debug!(subject_id = %subject_id, kind = %kind, "Artifact consumed concurrently");
            return Err(AuthError::ArtifactNotFound);
        };
        let taken: StoredArtifact = serde_json::from_str(&taken_raw)?;

        if !secrets_match(presented, &taken.secret) {
            self.restore(&key, &taken, &taken_raw).await?;
            warn!(subject_id = %subject_id, kind = %kind, "Artifact replaced during verification");
            return Err(AuthError::ArtifactMismatch);
        }

        info!(subject_id = %subject_id, kind = %kind, "Artifact consumed");
        Ok(VerifiedArtifact {
            subject_id,
            kind,
            payload: taken.payload,
        })
    }

    /// Delete the outstanding artifact of `kind` for `subject_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails.
    pub async fn invalidate(&self, kind: ArtifactKind, subject_id: SubjectId) -> Result<()> {
        self.store.delete(&kind.store_key(subject_id)).await?;
        debug!(subject_id = %subject_id, kind = %kind, "Artifact invalidated");
        Ok(())
    }

    /// Turn a subject reference into an id.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidIdentifier`] if an encrypted reference
    /// does not decrypt to a subject id.
    pub fn resolve_subject(&self, subject: &SubjectRef) -> Result<SubjectId> {
        match subject {
            SubjectRef::Plain(id) => Ok(*id),
            SubjectRef::Encrypted(blob) => self
                .crypto
                .decrypt_user_id(blob)
                .map_err(|_| AuthError::InvalidIdentifier),
        }
    }

    /// Put back an artifact taken on behalf of someone else. A newer one wins.
    async fn restore(&self, key: &str, record: &StoredArtifact, raw: &str) -> Result<()> {
        let now = self.clock.now();
        if record.is_expired_at(now) {
            return Ok(());
        }
        let restored = self
            .store
            .set_if_absent(key, raw.to_string(), ttl_from(record.expires_at - now))
            .await?;
        if !restored {
            debug!(key, "Newer artifact present; not restoring");
        }
        Ok(())
    }
}

impl<S> std::fmt::Debug for ArtifactVerifier<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactVerifier").finish_non_exhaustive()
    }
}

/// Full-length comparison of the trimmed presented value. Never a prefix match.
fn secrets_match(presented: &str, stored: &str) -> bool {
    let presented = presented.trim();
    !presented.is_empty() && constant_time_eq(presented.as_bytes(), stored.as_bytes())
}
