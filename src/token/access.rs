use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{StoreError, TokenError};
use crate::token::blacklist::TokenBlacklistStore;
use crate::token::jwt::{self, AccessTokenClaims};
use crate::token::TokenConfig;

/// Why an access token was not accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    #[error("token has been revoked")]
    Revoked,
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("revocation ledger unavailable")]
    StoreUnavailable,
}

impl From<TokenError> for TokenRejection {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::Expired,
            TokenError::InvalidSignature | TokenError::Key => Self::InvalidSignature,
            TokenError::InvalidIssuer => Self::InvalidIssuer,
            TokenError::InvalidAudience => Self::InvalidAudience,
            TokenError::Format
            | TokenError::Base64
            | TokenError::Json(_)
            | TokenError::UnsupportedAlg(_)
            | TokenError::BlankSubject => Self::Malformed,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AccessTokenService {
    config: Arc<TokenConfig>,
    clock: Arc<dyn Clock>,
    blacklist: TokenBlacklistStore,
}

impl AccessTokenService {
    #[must_use]
    pub fn new(config: Arc<TokenConfig>, clock: Arc<dyn Clock>, blacklist: TokenBlacklistStore) -> Self {
        Self {
            config,
            clock,
            blacklist,
        }
    }

    /// Sign a new access token for `subject`.
    ///
    /// # Errors
    /// Returns an error if the subject is blank or the claims cannot be encoded.
    pub fn issue(&self, subject: &str, authorities: &[String]) -> Result<String, TokenError> {
        if subject.trim().is_empty() {
            return Err(TokenError::BlankSubject);
        }
        let iat = self.clock.now().timestamp();
        let ttl = i64::try_from(self.config.access_ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = AccessTokenClaims {
            sub: subject.to_string(),
            authorities: authorities.to_vec(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            iat,
            exp: iat.saturating_add(ttl),
            jti: Uuid::new_v4().to_string(),
        };
        let token = jwt::sign_hs256(self.config.secret(), &claims)?;
        debug!(subject, jti = %claims.jti, "access token issued");
        Ok(token)
    }

    /// Verify `token` and explain the outcome. The revocation ledger is consulted
    /// first; if it cannot be reached the token is rejected.
    ///
    /// # Errors
    /// Returns the reason the token is not acceptable.
    pub async fn inspect(&self, token: &str) -> Result<AccessTokenClaims, TokenRejection> {
        match self.blacklist.is_blacklisted(token).await {
            Ok(true) => return Err(TokenRejection::Revoked),
            Ok(false) => {}
            Err(err) => {
                error!("revocation ledger unavailable, rejecting token: {err}");
                return Err(TokenRejection::StoreUnavailable);
            }
        }
        Ok(self.verify(token)?)
    }

    pub async fn validate(&self, token: &str) -> bool {
        match self.inspect(token).await {
            Ok(_) => true,
            Err(rejection) => {
                debug!("access token rejected: {rejection}");
                false
            }
        }
    }

    /// Read one claim from a verified token.
    ///
    /// # Errors
    /// Returns an error if the token cannot be parsed or verified.
    pub fn extract_claim<T, F>(&self, token: &str, selector: F) -> Result<T, TokenError>
    where
        F: FnOnce(&AccessTokenClaims) -> T,
    {
        self.verify(token).map(|claims| selector(&claims))
    }

    /// # Errors
    /// Returns an error if the token cannot be parsed or verified.
    pub fn subject(&self, token: &str) -> Result<String, TokenError> {
        self.extract_claim(token, |claims| claims.sub.clone())
    }

    /// # Errors
    /// Returns an error if the token cannot be parsed or verified.
    pub fn expires_at(&self, token: &str) -> Result<DateTime<Utc>, TokenError> {
        let exp = self.extract_claim(token, |claims| claims.exp)?;
        DateTime::<Utc>::from_timestamp(exp, 0).ok_or(TokenError::Format)
    }

    /// True when the token is past its expiry or cannot be read at all.
    #[must_use]
    pub fn is_expired(&self, token: &str) -> bool {
        match jwt::verify_signature(token, self.config.secret()) {
            Ok(claims) => claims.exp <= self.clock.now().timestamp(),
            Err(_) => true,
        }
    }

    /// Add `token` to the revocation ledger until it would expire. Tokens whose
    /// expiry cannot be read are revoked for the full access token lifetime.
    ///
    /// # Errors
    /// Returns an error if the ledger cannot be written.
    pub async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        let expiry = jwt::verify_signature(token, self.config.secret())
            .ok()
            .and_then(|claims| DateTime::<Utc>::from_timestamp(claims.exp, 0));
        match expiry {
            Some(expires_at) => self.blacklist.add_until(token, expires_at).await?,
            None => self.blacklist.add(token).await?,
        }
        info!("access token revoked");
        Ok(())
    }

    fn verify(&self, token: &str) -> Result<AccessTokenClaims, TokenError> {
        jwt::verify_hs256(
            token,
            self.config.secret(),
            &self.config.issuer,
            &self.config.audience,
            self.clock.now().timestamp(),
        )
    }
}
