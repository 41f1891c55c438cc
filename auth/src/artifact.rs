//! Authentication artifacts.
//!
//! An artifact is one outstanding, single-use, time-boxed challenge: an
//! emailed code or a magic-link token. At most one live artifact exists per
//! `(subject, kind)`; issuing a new one overwrites the old.

use crate::constants::keys;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of an account, owned by the host's user store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub u64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SubjectId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Artifact kinds. Each kind has its own slot per subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Emailed sign-in code.
    LoginCode,

    /// Token embedded in a magic sign-in link.
    MagicLinkToken,

    /// Code confirming account deletion.
    DeletionCode,

    /// Code confirming ownership of a new email address.
    EmailChangeCode,
}

impl ArtifactKind {
    /// Stable name used in store keys and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LoginCode => "login_code",
            Self::MagicLinkToken => "magic_link",
            Self::DeletionCode => "deletion_code",
            Self::EmailChangeCode => "email_change_code",
        }
    }

    /// All kinds, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::LoginCode,
        Self::MagicLinkToken,
        Self::DeletionCode,
        Self::EmailChangeCode,
    ];

    /// Store key holding the artifact of this kind for `subject_id`.
    #[must_use]
    pub fn store_key(self, subject_id: SubjectId) -> String {
        format!("{}:{}:{}", keys::ARTIFACT, self.as_str(), subject_id)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown artifact kind: {s}"))
    }
}

/// Artifact as persisted in the TTL store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// Account the artifact belongs to.
    pub subject_id: SubjectId,

    /// Artifact kind.
    pub kind: ArtifactKind,

    /// Plaintext code or token.
    pub secret: String,

    /// Opaque data bound to the artifact (the pending address for an email change).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    /// Creation time.
    pub created_at: DateTime<Utc>,

    /// Expiration time (last valid instant).
    pub expires_at: DateTime<Utc>,
}

impl StoredArtifact {
    /// `true` once `now` is strictly past `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// Secrets never reach logs through Debug.
impl fmt::Debug for StoredArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredArtifact")
            .field("subject_id", &self.subject_id)
            .field("kind", &self.kind)
            .field("secret", &"<redacted>")
            .field("has_payload", &self.payload.is_some())
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The external-facing form of a freshly issued artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentedArtifact {
    /// A code to be emailed as-is.
    Code {
        /// The plaintext code.
        code: String,
        /// Expiration time.
        expires_at: DateTime<Utc>,
    },

    /// A magic sign-in URL.
    MagicLink {
        /// `<base>/?action=magic_login&uid=..&token=..`
        url: String,
        /// Expiration time.
        expires_at: DateTime<Utc>,
    },

    /// An email verification URL carrying a code.
    VerificationLink {
        /// `<base>/?action=verify_email&user_id=..&code=..`
        url: String,
        /// The plaintext code embedded in the URL.
        code: String,
        /// Expiration time.
        expires_at: DateTime<Utc>,
    },
}

impl PresentedArtifact {
    /// Expiration time of the underlying artifact.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        match self {
            Self::Code { expires_at, .. }
            | Self::MagicLink { expires_at, .. }
            | Self::VerificationLink { expires_at, .. } => *expires_at,
        }
    }

    /// The URL, for link-shaped artifacts.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Code { .. } => None,
            Self::MagicLink { url, .. } | Self::VerificationLink { url, .. } => Some(url),
        }
    }
}

/// How a verification request names its subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRef {
    /// The caller already knows the subject (e.g. looked up by email).
    Plain(SubjectId),

    /// URL-safe encrypted identifier taken from a link.
    Encrypted(String),
}

impl From<SubjectId> for SubjectRef {
    fn from(id: SubjectId) -> Self {
        Self::Plain(id)
    }
}

/// Successful verification outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    /// The authenticated subject.
    pub subject_id: SubjectId,

    /// Kind of the consumed artifact.
    pub kind: ArtifactKind,

    /// Payload stored at issuance, if any.
    pub payload: Option<String>,
}
