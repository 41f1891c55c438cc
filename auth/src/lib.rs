//! # Onetime Auth
//!
//! Single-use authentication artifacts for passwordless email sign-in:
//! emailed login codes, encrypted magic links, account deletion and email
//! change confirmations, guarded by per-IP attempt counting and lockout.
//!
//! ## Features
//!
//! - **Single-use**: an artifact is consumed atomically on first successful use
//! - **Time-boxed**: expiry is checked as data against an injected clock
//! - **One live artifact per kind**: a new issuance replaces the old one
//! - **Opaque links**: subject ids in URLs are AES-256-GCM encrypted
//! - **Abuse resistant**: per `(ip, action)` windows escalate to a timed lockout
//! - **Stateless**: all state lives in a [`providers::TtlStore`] (memory or Redis)
//!
//! ## Architecture
//!
//! ```text
//! SiteSecrets ─▶ KeyDerivation ─▶ CryptoBox ─┬─▶ ArtifactIssuer ──┐
//!                                            └─▶ ArtifactVerifier ├─▶ TtlStore
//!                                 RateLimiter ───────────────────┘
//!                       PasswordlessFlow = limiter + issuer + verifier + EmailSender
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use onetime_auth::*;
//! use onetime_auth::mocks::MockEmailSender;
//! use onetime_auth::stores::MemoryStore;
//! use onetime_core::environment::{Clock, SystemClock};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let clock: Arc<dyn Clock> = Arc::new(SystemClock);
//! let crypto = Arc::new(CryptoBox::from_secrets(SiteSecrets::from_env()?));
//! let flow = PasswordlessFlow::new(
//!     MemoryStore::with_clock(clock.clone()),
//!     MockEmailSender::new(),
//!     crypto,
//!     clock,
//!     AuthConfig::new("https://app.example.com"),
//!     RateLimitConfig::default(),
//! );
//!
//! let ip = "203.0.113.7".parse().map_err(|_| AuthError::InvalidIdentifier)?;
//! flow.request_login_code(ip, "user@example.com", Some(SubjectId(42))).await?;
//! // ... the user types the code from the email ...
//! let subject = flow.verify_login_code(ip, SubjectId(42), "123456").await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod artifact;
pub mod client_ip;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod flow;
pub mod issuer;
pub mod providers;
pub mod rate_limit;
pub mod stores;
pub mod utils;
pub mod verifier;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use artifact::{
    ArtifactKind, PresentedArtifact, StoredArtifact, SubjectId, SubjectRef, VerifiedArtifact,
};
pub use client_ip::{ClientIpConfig, ClientIpResolver};
pub use config::{AuthConfig, CodeCharset, RateLimitConfig, SiteSecrets};
pub use crypto::{CryptoBox, KeyDerivation, Purpose};
pub use error::{AuthError, Result};
pub use flow::{EmailChange, PasswordlessFlow};
pub use issuer::ArtifactIssuer;
pub use rate_limit::{ActionClass, AttemptWindow, LockoutRecord, RateLimitDecision, RateLimiter, SweepReport};
pub use verifier::ArtifactVerifier;
