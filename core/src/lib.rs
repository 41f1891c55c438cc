//! # Onetime Core
//!
//! Environment traits shared by the onetime authentication crates.
//!
//! Every component that needs the outside world receives it through a trait
//! defined here (or in the provider module of the crate that owns the
//! concern), never through ambient global state. This keeps the
//! authentication logic deterministic under test: swap [`environment::SystemClock`]
//! for a fixed or manually advanced clock and every expiry decision becomes
//! reproducible.
//!
//! ## Example
//!
//! ```
//! use onetime_core::environment::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let before = clock.now();
//! assert!(clock.now() >= before);
//! ```

/// Environment module - Dependency injection traits
///
/// All external dependencies are abstracted behind traits and injected
/// through constructors.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Production - uses system clock
    /// struct SystemClock;
    /// impl Clock for SystemClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         Utc::now()
    ///     }
    /// }
    ///
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time from the operating system.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
        fn now(&self) -> DateTime<Utc> {
            (**self).now()
        }
    }
}
