//! Access and refresh token lifecycle.
//!
//! Access tokens are HS256 JWTs (`sub`, `authorities`, `iss`, `aud`, `iat`, `exp`,
//! `jti`). Revocation writes the token digest to a ledger entry that expires when
//! the token would have. Refresh tokens are 256-bit random strings stored by digest,
//! with a per-principal index enforcing a single active token.
//!
//! Validation fails closed: if the store cannot be reached, tokens are invalid.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use crate::error::ConfigError;

pub mod access;
pub mod blacklist;
pub mod jwt;
pub mod refresh;

pub use self::access::{AccessTokenService, TokenRejection};
pub use self::blacklist::TokenBlacklistStore;
pub use self::jwt::AccessTokenClaims;
pub use self::refresh::{RefreshRecord, RefreshTokenService};

pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Clone)]
pub struct TokenConfig {
    secret: SecretString,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self {
            secret,
            issuer: "warden".to_string(),
            audience: "warden-users".to_string(),
            access_ttl: Duration::from_secs(3600),
            refresh_ttl: Duration::from_secs(2_592_000),
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub(crate) fn secret(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }

    /// # Errors
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let actual = self.secret().len();
        if actual < MIN_SECRET_BYTES {
            return Err(ConfigError::WeakSecret {
                min: MIN_SECRET_BYTES,
                actual,
            });
        }
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::Blank("jwt_issuer"));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::Blank("jwt_audience"));
        }
        if self.access_ttl.as_secs() == 0 {
            return Err(ConfigError::NotPositive("access_token_ttl_seconds"));
        }
        if self.refresh_ttl.as_secs() == 0 {
            return Err(ConfigError::NotPositive("refresh_token_ttl_seconds"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"***")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}
