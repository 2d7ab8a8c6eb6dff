use std::time::Duration;
use thiserror::Error;

/// Failures talking to the shared TTL store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("value at {key} has the wrong type")]
    WrongType { key: String },
    #[error("corrupt record at {key}")]
    Corrupt { key: String },
}

/// Reasons an access token could not be encoded, parsed or verified.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    Format,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signing key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("token expired")]
    Expired,
    #[error("token subject must not be blank")]
    BlankSubject,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("signing secret must be at least {min} bytes, got {actual}")]
    WeakSecret { min: usize, actual: usize },
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("max delay ({max}s) must not be lower than base delay ({base}s)")]
    DelayBounds { base: u32, max: u32 },
    #[error("business hours {start}-{end} are not a valid range within 0-23")]
    BusinessHours { start: u32, end: u32 },
    #[error("{0} must not be blank")]
    Blank(&'static str),
}

/// Umbrella error for operations that can fail for more than one reason.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("failed to gather randomness: {0}")]
    Entropy(#[from] rand::Error),
    #[error("invariant violated: {0}")]
    Invariant(String),
}
