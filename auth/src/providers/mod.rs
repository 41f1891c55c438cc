//! Provider traits for external dependencies.
//!
//! The artifact engine talks to the outside world through two seams:
//!
//! - [`TtlStore`]: key-value storage with per-key expiry
//! - [`EmailSender`]: outbound mail
//!
//! Time comes from [`onetime_core::environment::Clock`].
//!
//! # Implementations
//!
//! - Stores: [`crate::stores::MemoryStore`], [`crate::stores::RedisStore`]
//! - Email: [`ConsoleEmailSender`], [`SmtpEmailSender`]
//! - Mocks (feature `test-utils`): [`crate::mocks::MockEmailSender`]

pub mod console_email;
pub mod email;
pub mod smtp_email;
pub mod ttl_store;

pub use console_email::ConsoleEmailSender;
pub use email::EmailSender;
pub use smtp_email::SmtpEmailSender;
pub use ttl_store::{TtlStore, ttl_from};
