//! Shared TTL store abstraction.
//!
//! Every piece of throttling and token state lives behind [`TtlStore`]. The
//! operations mirror a small subset of Redis so that [`RedisStore`] maps them one to
//! one, while [`MemoryStore`] provides the same semantics inside a single process
//! for local runs and tests.
//!
//! ## Key Patterns
//!
//! ```text
//! ip:req:{ip}:min:{yyyyMMddHHmm}     → request counter (TTL 60s)
//! ip:req:{ip}:hour:{yyyyMMddHH}      → request counter (TTL 3600s)
//! ip:req:{ip}:day:{yyyyMMdd}         → request counter (TTL 86400s)
//! ip:login:{ip}:hour:{yyyyMMddHH}    → login attempt counter (TTL 3600s)
//! ip:blacklist:{ip}                  → ListEntry JSON (optional TTL)
//! ip:whitelist:{ip}                  → ListEntry JSON (no TTL)
//! ip:stats:{ip}:ua                   → set of user agents (TTL 24h)
//! ip:stats:{ip}:users                → set of usernames (TTL 24h)
//! ip:stats:{ip}:failures             → failed login counter (TTL 3600s)
//! ip:threat:{ip}                     → threat score (TTL 24h, sliding)
//! jwt:blacklist:{sha256(token)}      → revoked access token (TTL = remaining lifetime)
//! jwt:refresh:{sha256(token)}        → refresh token record JSON
//! jwt:user_refresh:{principal}       → sha256 of the active refresh token
//! ```

use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Duration;

use crate::error::StoreError;

pub mod keys;
mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

#[async_trait]
pub trait TtlStore: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a string value. `None` keeps the key until it is deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Delete a key, returning whether it existed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Add a member to a set and (re)apply the TTL to the whole set.
    async fn sadd(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    async fn scard(&self, key: &str) -> Result<u64, StoreError>;

    /// Increment a counter by one. The TTL is applied only when the increment
    /// created the key, in the same atomic step.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Add `delta` to a floating point value, refresh its TTL and return the new total.
    async fn incr_by_float(&self, key: &str, delta: f64, ttl: Duration)
        -> Result<f64, StoreError>;
}
