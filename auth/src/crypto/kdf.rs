//! Per-purpose key derivation.
//!
//! Keys are derived with PBKDF2-HMAC-SHA256 from the long-term
//! [`SiteSecrets`]. The purpose label is the password and a purpose-specific
//! pair of secrets is the salt:
//!
//! | Purpose | Label | Salt |
//! |---|---|---|
//! | [`Purpose::Storage`] | `"storage"` | `auth_salt ‖ storage_salt` |
//! | [`Purpose::Url`] | `"url"` | `url_salt ‖ nonce_salt` |
//!
//! The two salts share no secret, so the storage and URL keys are unrelated
//! even if one secret leaks.

use crate::config::SiteSecrets;
use crate::constants::kdf::{KEY_LEN, PBKDF2_ROUNDS};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

/// What a derived key is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Values persisted server-side. Encoded as standard base64.
    Storage,

    /// Values placed in URLs. Encoded as unpadded URL-safe base64.
    Url,
}

impl Purpose {
    /// Label fed to the KDF as its password.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Url => "url",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Derives 32-byte keys from the site secrets.
#[derive(Clone)]
pub struct KeyDerivation {
    secrets: SiteSecrets,
}

impl KeyDerivation {
    /// Create a key derivation over the given secrets.
    #[must_use]
    pub const fn new(secrets: SiteSecrets) -> Self {
        Self { secrets }
    }

    /// Derive the key for `purpose`.
    ///
    /// Deterministic for a given set of secrets. This is deliberately slow
    /// (10 000 rounds); callers derive once and keep the key.
    #[must_use]
    pub fn derive_key(&self, purpose: Purpose) -> Zeroizing<[u8; KEY_LEN]> {
        let salt = self.salt_for(purpose);
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(purpose.label().as_bytes(), &salt, PBKDF2_ROUNDS, &mut *key);
        tracing::debug!(purpose = %purpose, "Derived encryption key");
        key
    }

    fn salt_for(&self, purpose: Purpose) -> Zeroizing<Vec<u8>> {
        let (first, second) = match purpose {
            Purpose::Storage => (&self.secrets.auth_salt, &self.secrets.storage_salt),
            Purpose::Url => (&self.secrets.url_salt, &self.secrets.nonce_salt),
        };

        let mut salt = Zeroizing::new(Vec::with_capacity(first.len() + second.len()));
        salt.extend_from_slice(first.as_bytes());
        salt.extend_from_slice(second.as_bytes());
        salt
    }
}

impl fmt::Debug for KeyDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDerivation").finish_non_exhaustive()
    }
}
