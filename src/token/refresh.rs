//! Opaque refresh tokens with at most one active token per principal.
//!
//! Flow Overview:
//! 1) `issue` revokes whatever the principal held, then writes the record
//!    (`jwt:refresh:{digest}`) and the index (`jwt:user_refresh:{principal}`).
//! 2) `validate` reads the record and drops it if its recorded expiry has passed.
//! 3) `revoke` and `revoke_for_principal` delete both keys.
//!
//! A concurrent `issue` and `revoke` for the same principal can leave one key stale
//! until its TTL expires. Validation always goes through the record, so a stale
//! index never makes a token valid.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::error::{Error, StoreError};
use crate::store::{keys, TtlStore};
use crate::token::access::AccessTokenService;
use crate::token::TokenConfig;

const TOKEN_BYTES: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub principal: String,
    #[serde(default)]
    pub authorities: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct RefreshTokenService {
    store: Arc<dyn TtlStore>,
    clock: Arc<dyn Clock>,
    config: Arc<TokenConfig>,
    access: AccessTokenService,
}

/// 32 random bytes encode to exactly 43 unpadded base64url characters.
#[must_use]
pub fn is_refresh_token_format(token: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_-]{43}$").is_ok_and(|regex| regex.is_match(token))
}

impl RefreshTokenService {
    #[must_use]
    pub fn new(
        store: Arc<dyn TtlStore>,
        clock: Arc<dyn Clock>,
        config: Arc<TokenConfig>,
        access: AccessTokenService,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            access,
        }
    }

    /// Issue a refresh token for `principal`, revoking any token it already holds.
    ///
    /// # Errors
    /// Returns an error if the principal is blank, randomness is unavailable or the
    /// store cannot be written.
    pub async fn issue(&self, principal: &str, authorities: &[String]) -> Result<String, Error> {
        if principal.trim().is_empty() {
            return Err(Error::InvalidInput("principal must not be blank"));
        }
        self.revoke_for_principal(principal).await?;

        let mut bytes = [0_u8; TOKEN_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;
        let token = Base64UrlUnpadded::encode_string(&bytes);
        let digest = keys::digest(&token);

        let ttl = self.config.refresh_ttl;
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or(Error::InvalidInput("refresh token ttl is out of range"))?;
        let record = RefreshRecord {
            principal: principal.to_string(),
            authorities: authorities.to_vec(),
            expires_at,
        };
        let encoded = serde_json::to_string(&record)
            .map_err(|err| Error::Invariant(format!("refresh record encoding: {err}")))?;

        self.store
            .set(&keys::refresh_record(&digest), &encoded, Some(ttl))
            .await?;
        self.store
            .set(&keys::principal_refresh(principal), &digest, Some(ttl))
            .await?;
        info!(principal, "refresh token issued");
        Ok(token)
    }

    /// Owning principal of `token`, or `None` when it is unknown, expired or the
    /// store cannot be reached.
    pub async fn validate(&self, token: &str) -> Option<String> {
        self.active_record(token)
            .await
            .map(|record| record.principal)
    }

    /// Issue a new access token for the owner of `token`. The refresh token stays valid.
    pub async fn refresh_access_token(&self, token: &str) -> Option<String> {
        let record = self.active_record(token).await?;
        match self.access.issue(&record.principal, &record.authorities) {
            Ok(access_token) => Some(access_token),
            Err(err) => {
                error!(principal = %record.principal, "failed to issue access token: {err}");
                None
            }
        }
    }

    /// Delete `token` and its principal index. Returns whether anything was deleted.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn revoke(&self, token: &str) -> Result<bool, StoreError> {
        if !is_refresh_token_format(token) {
            return Ok(false);
        }
        let digest = keys::digest(token);
        let record_key = keys::refresh_record(&digest);
        let record = self.read_record(&record_key).await.unwrap_or_else(|err| {
            debug!("dropping unreadable refresh record: {err}");
            None
        });
        let removed = self.drop_record(&digest, record.as_ref()).await?;
        if let Some(record) = record {
            info!(principal = %record.principal, "refresh token revoked");
        }
        Ok(removed)
    }

    /// Delete the record for `digest` and the owner's index if it still points at it.
    async fn drop_record(
        &self,
        digest: &str,
        record: Option<&RefreshRecord>,
    ) -> Result<bool, StoreError> {
        let mut removed = self.store.del(&keys::refresh_record(digest)).await?;
        if let Some(record) = record {
            let index_key = keys::principal_refresh(&record.principal);
            // The index may already point at a newer token.
            if self.store.get(&index_key).await?.as_deref() == Some(digest) {
                removed |= self.store.del(&index_key).await?;
            }
        }
        Ok(removed)
    }

    /// Revoke the active token of `principal`, if any.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn revoke_for_principal(&self, principal: &str) -> Result<bool, StoreError> {
        let index_key = keys::principal_refresh(principal);
        let Some(digest) = self.store.get(&index_key).await? else {
            return Ok(false);
        };
        let record_removed = self.store.del(&keys::refresh_record(&digest)).await?;
        let index_removed = self.store.del(&index_key).await?;
        debug!(principal, "previous refresh token revoked");
        Ok(record_removed || index_removed)
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn has_active_token(&self, principal: &str) -> Result<bool, StoreError> {
        let Some(digest) = self.store.get(&keys::principal_refresh(principal)).await? else {
            return Ok(false);
        };
        self.store.exists(&keys::refresh_record(&digest)).await
    }

    async fn active_record(&self, token: &str) -> Option<RefreshRecord> {
        if !is_refresh_token_format(token) {
            return None;
        }
        let digest = keys::digest(token);
        let record = match self.read_record(&keys::refresh_record(&digest)).await {
            Ok(record) => record?,
            Err(err) => {
                error!("refresh token store unavailable, rejecting token: {err}");
                return None;
            }
        };

        if record.expires_at <= self.clock.now() {
            debug!(principal = %record.principal, "refresh token expired");
            if let Err(err) = self.drop_record(&digest, Some(&record)).await {
                error!("failed to drop expired refresh token: {err}");
            }
            return None;
        }
        Some(record)
    }

    async fn read_record(&self, key: &str) -> Result<Option<RefreshRecord>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
            })
    }
}
