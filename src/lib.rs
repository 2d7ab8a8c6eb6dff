//! # Warden (Request Throttling & Token Lifecycle)
//!
//! `warden` protects an authenticated HTTP service. It decides whether a source
//! address may keep talking to the service, accumulates abuse signals per address,
//! and owns the lifecycle of access and refresh tokens.
//!
//! ## Shared State
//!
//! There is no in-process mutable state. Every counter, flag and token record lives
//! in an external [`store::TtlStore`] (Redis in production). The only atomic primitive
//! relied upon is "increment and set the TTL if the key was just created"; everything
//! else is read fresh per call and tolerates eventual consistency.
//!
//! ## Failure Modes
//!
//! - **Throttling fails open:** if the store is unreachable, requests are allowed and
//!   login attempts are silently dropped from the statistics.
//! - **Token validation fails closed:** if the store is unreachable, access and refresh
//!   tokens are treated as invalid.
//!
//! ## Tokens
//!
//! Access tokens are HS256 JWTs checked against a revocation ledger whose entries expire
//! together with the token. Refresh tokens are opaque random strings; at most one is
//! active per principal, and issuing a new one revokes the previous one.

pub mod api;
pub mod cli;
pub mod clock;
pub mod error;
pub mod store;
pub mod throttle;
pub mod token;
pub mod warden;

pub use crate::error::{ConfigError, Error, StoreError, TokenError};
pub use crate::warden::Warden;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
