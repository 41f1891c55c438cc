//! Mock provider implementations for testing.
//!
//! In-memory doubles for the provider traits that have no in-crate
//! production implementation suitable for tests. For storage use
//! [`crate::stores::MemoryStore`] with a manual clock.

pub mod email;

pub use email::{MockEmailSender, SentEmail};
