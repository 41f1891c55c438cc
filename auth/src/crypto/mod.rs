//! Key derivation and authenticated encryption.
//!
//! - [`KeyDerivation`] turns the site secrets into one key per [`Purpose`]
//! - [`CryptoBox`] encrypts identifiers and tokens into base64 blobs

pub mod cipher;
pub mod kdf;

pub use cipher::CryptoBox;
pub use kdf::{KeyDerivation, Purpose};
