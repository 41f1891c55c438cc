//! Authenticated symmetric encryption for identifiers and tokens.
//!
//! # Format
//!
//! ```text
//! blob = base64( nonce[12] ‖ ciphertext ‖ tag[16] )
//! ```
//!
//! - **AES-256-GCM** with a fresh 96-bit nonce from the OS CSPRNG per call
//! - [`Purpose::Storage`] blobs use standard padded base64
//! - [`Purpose::Url`] blobs use URL-safe base64 without padding; decoding
//!   accepts padded or unpadded input
//!
//! # Security
//!
//! - Decryption fails closed: malformed base64, short input, a wrong key or
//!   any flipped bit yields [`AuthError::CryptoFailure`], never plaintext
//! - Keys are derived once at construction and wiped when the box is dropped

use crate::artifact::SubjectId;
use crate::config::SiteSecrets;
use crate::constants::kdf::KEY_LEN;
use crate::crypto::kdf::{KeyDerivation, Purpose};
use crate::error::{AuthError, Result};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use std::fmt;
use zeroize::Zeroizing;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// URL-safe alphabet, no padding on encode, either form accepted on decode.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encrypts and decrypts small values with per-purpose keys.
///
/// # Example
///
/// ```
/// use onetime_auth::config::SiteSecrets;
/// use onetime_auth::crypto::{CryptoBox, Purpose};
/// use onetime_auth::SubjectId;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let secrets = SiteSecrets::new("s1-random", "s2-random", "s3-random", "s4-random")?;
/// let crypto = CryptoBox::from_secrets(secrets);
///
/// let blob = crypto.encrypt_user_id(SubjectId(42))?;
/// assert_eq!(crypto.decrypt_user_id(&blob)?, SubjectId(42));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CryptoBox {
    storage_key: Zeroizing<[u8; KEY_LEN]>,
    url_key: Zeroizing<[u8; KEY_LEN]>,
}

impl CryptoBox {
    /// Derive both purpose keys up front.
    #[must_use]
    pub fn new(kdf: &KeyDerivation) -> Self {
        Self {
            storage_key: kdf.derive_key(Purpose::Storage),
            url_key: kdf.derive_key(Purpose::Url),
        }
    }

    /// Shorthand for `CryptoBox::new(&KeyDerivation::new(secrets))`.
    #[must_use]
    pub fn from_secrets(secrets: SiteSecrets) -> Self {
        Self::new(&KeyDerivation::new(secrets))
    }

    fn cipher(&self, purpose: Purpose) -> Result<Aes256Gcm> {
        let key = match purpose {
            Purpose::Storage => &self.storage_key,
            Purpose::Url => &self.url_key,
        };
        Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| AuthError::CryptoFailure(format!("invalid key: {e}")))
    }

    fn engine(purpose: Purpose) -> &'static GeneralPurpose {
        match purpose {
            Purpose::Storage => &STANDARD,
            Purpose::Url => &URL_SAFE_LENIENT,
        }
    }

    /// Encrypt `plaintext` for `purpose`.
    ///
    /// Two calls with the same input produce different blobs.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CryptoFailure`] if the AEAD primitive fails.
    pub fn encrypt(&self, plaintext: &[u8], purpose: Purpose) -> Result<String> {
        let cipher = self.cipher(purpose)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher.encrypt(&nonce, plaintext).map_err(|e| {
            tracing::error!(purpose = %purpose, error = %e, "Encryption failed");
            AuthError::CryptoFailure(format!("encryption failed: {e}"))
        })?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(Self::engine(purpose).encode(blob))
    }

    /// Decrypt a blob produced by [`CryptoBox::encrypt`] with the same purpose.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CryptoFailure`] if the blob is not valid base64,
    /// is shorter than nonce + tag, or fails authentication.
    pub fn decrypt(&self, blob: &str, purpose: Purpose) -> Result<Zeroizing<Vec<u8>>> {
        let raw = Self::engine(purpose)
            .decode(blob.as_bytes())
            .map_err(|e| Self::reject(purpose, &format!("malformed base64: {e}")))?;

        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(Self::reject(purpose, "blob shorter than nonce and tag"));
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher(purpose)?
            .decrypt(nonce, ciphertext)
            .map_err(|_| Self::reject(purpose, "authentication failed"))?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Encrypt a subject id for use in a URL.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CryptoFailure`] if encryption fails.
    pub fn encrypt_user_id(&self, id: SubjectId) -> Result<String> {
        self.encrypt(id.to_string().as_bytes(), Purpose::Url)
    }

    /// Recover a subject id from a URL blob.
    ///
    /// The payload must be a canonical non-negative decimal integer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CryptoFailure`] if decryption fails or the payload
    /// is not a valid id.
    pub fn decrypt_user_id(&self, blob: &str) -> Result<SubjectId> {
        let plaintext = self.decrypt(blob, Purpose::Url)?;
        parse_subject_id(&plaintext)
            .ok_or_else(|| Self::reject(Purpose::Url, "payload is not a subject id"))
    }

    fn reject(purpose: Purpose, reason: &str) -> AuthError {
        // The reason is diagnostic only; the input itself is never logged.
        tracing::warn!(purpose = %purpose, reason = reason, "Decryption rejected");
        AuthError::CryptoFailure(reason.to_string())
    }
}

/// Canonical decimal: digits only, no sign, no leading zeros (except "0").
fn parse_subject_id(bytes: &[u8]) -> Option<SubjectId> {
    let canonical = !bytes.is_empty()
        && bytes.iter().all(u8::is_ascii_digit)
        && (bytes.len() == 1 || bytes[0] != b'0');
    if !canonical {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok().map(SubjectId)
}

impl fmt::Debug for CryptoBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoBox").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::OnceLock;

    fn crypto() -> &'static CryptoBox {
        static CRYPTO: OnceLock<CryptoBox> = OnceLock::new();
        CRYPTO.get_or_init(|| {
            CryptoBox::from_secrets(SiteSecrets::new("one", "two", "three", "four").unwrap())
        })
    }

    #[test]
    fn test_round_trip_both_purposes() {
        for purpose in [Purpose::Storage, Purpose::Url] {
            let blob = crypto().encrypt(b"hello world", purpose).unwrap();
            let plaintext = crypto().decrypt(&blob, purpose).unwrap();
            assert_eq!(plaintext.as_slice(), b"hello world");
        }
    }

    #[test]
    fn test_url_blob_is_url_safe_and_unpadded() {
        for _ in 0..50 {
            let blob = crypto().encrypt(b"12345", Purpose::Url).unwrap();
            assert!(
                blob.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'),
                "unexpected character in {blob}"
            );
        }
    }

    #[test]
    fn test_url_decode_accepts_padding() {
        // 12 + 4 + 16 = 32 bytes, which needs one padding character
        let blob = crypto().encrypt(b"1234", Purpose::Url).unwrap();
        let padded = format!("{blob}{}", "=".repeat((4 - blob.len() % 4) % 4));
        assert_eq!(crypto().decrypt(&padded, Purpose::Url).unwrap().as_slice(), b"1234");
    }

    #[test]
    fn test_same_plaintext_encrypts_differently() {
        let blobs: HashSet<String> = (0..1000)
            .map(|_| crypto().encrypt(b"42", Purpose::Url).unwrap())
            .collect();
        assert_eq!(blobs.len(), 1000);
    }

    #[test]
    fn test_every_flipped_byte_is_rejected() {
        let blob = crypto().encrypt(b"42", Purpose::Storage).unwrap();
        let raw = STANDARD.decode(&blob).unwrap();

        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            let result = crypto().decrypt(&STANDARD.encode(&tampered), Purpose::Storage);
            assert!(
                matches!(result, Err(AuthError::CryptoFailure(_))),
                "byte {i} flip was accepted"
            );
        }
    }

    #[test]
    fn test_purpose_keys_do_not_cross_decrypt() {
        let blob = crypto().encrypt(b"secret", Purpose::Url).unwrap();
        let as_standard = STANDARD.encode(URL_SAFE_LENIENT.decode(&blob).unwrap());
        assert!(crypto().decrypt(&as_standard, Purpose::Storage).is_err());
    }

    #[test]
    fn test_malformed_and_short_input_fail_closed() {
        assert!(matches!(
            crypto().decrypt("not-base64!!", Purpose::Url),
            Err(AuthError::CryptoFailure(_))
        ));
        assert!(matches!(
            crypto().decrypt("", Purpose::Url),
            Err(AuthError::CryptoFailure(_))
        ));
        let short = URL_SAFE_LENIENT.encode([0u8; NONCE_LEN + TAG_LEN - 1]);
        assert!(matches!(
            crypto().decrypt(&short, Purpose::Url),
            Err(AuthError::CryptoFailure(_))
        ));
    }

    #[test]
    fn test_user_id_round_trip() {
        let blob = crypto().encrypt_user_id(SubjectId(42)).unwrap();
        assert_eq!(crypto().decrypt_user_id(&blob).unwrap(), SubjectId(42));
        assert!(matches!(
            crypto().decrypt_user_id("not-base64!!"),
            Err(AuthError::CryptoFailure(_))
        ));
    }

    #[test]
    fn test_decrypt_user_id_rejects_non_numeric_payloads() {
        for payload in [&b"abc"[..], b"-1", b"007", b"", b"4 2", b"18446744073709551616"] {
            let blob = crypto().encrypt(payload, Purpose::Url).unwrap();
            assert!(
                matches!(crypto().decrypt_user_id(&blob), Err(AuthError::CryptoFailure(_))),
                "payload {payload:?} accepted"
            );
        }
    }

    #[test]
    fn test_parse_subject_id_canonical_forms() {
        assert_eq!(parse_subject_id(b"0"), Some(SubjectId(0)));
        assert_eq!(parse_subject_id(b"42"), Some(SubjectId(42)));
        assert_eq!(parse_subject_id(b"042"), None);
        assert_eq!(parse_subject_id(b"+42"), None);
    }
}
