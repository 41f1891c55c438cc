//! Storage implementations for the artifact engine.
//!
//! - **Memory Store** - Single-process map with clock-driven expiry
//! - **Redis Store** - Shared store with native TTL and atomic `GETDEL`

pub mod memory;
pub mod ttl_redis;

pub use memory::MemoryStore;
pub use ttl_redis::RedisStore;
