//! Entry point used by the HTTP layer.
//!
//! [`Warden`] wires the throttle and token services over one shared store and
//! clock. It is cheap to clone; every component holds `Arc`s.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::error::{ConfigError, Error, StoreError, TokenError};
use crate::store::{keys, TtlStore};
use crate::throttle::{
    IpListStore, IpStatistics, LoginAttemptGuard, RequestThrottle, SecurityPolicy,
    StatisticsReader, ThreatScoreAccumulator,
};
use crate::token::{
    AccessTokenClaims, AccessTokenService, RefreshTokenService, TokenBlacklistStore, TokenConfig,
    TokenRejection,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

#[derive(Clone, Debug)]
pub struct Warden {
    store: Arc<dyn TtlStore>,
    policy: Arc<SecurityPolicy>,
    tokens: Arc<TokenConfig>,
    lists: IpListStore,
    threat: ThreatScoreAccumulator,
    requests: RequestThrottle,
    logins: LoginAttemptGuard,
    stats: StatisticsReader,
    access: AccessTokenService,
    refresh: RefreshTokenService,
}

impl Warden {
    /// # Errors
    /// Returns an error if the policy or token configuration is invalid.
    pub fn new(
        store: Arc<dyn TtlStore>,
        clock: Arc<dyn Clock>,
        policy: SecurityPolicy,
        tokens: TokenConfig,
    ) -> Result<Self, ConfigError> {
        policy.validate()?;
        tokens.validate()?;
        let policy = Arc::new(policy);
        let tokens = Arc::new(tokens);

        let lists = IpListStore::new(
            store.clone(),
            clock.clone(),
            policy.blacklist_duration_minutes,
        );
        let threat = ThreatScoreAccumulator::new(store.clone(), lists.clone(), policy.threat_threshold);
        let requests = RequestThrottle::new(
            store.clone(),
            clock.clone(),
            policy.clone(),
            lists.clone(),
            threat.clone(),
        );
        let logins = LoginAttemptGuard::new(
            store.clone(),
            clock.clone(),
            policy.clone(),
            lists.clone(),
            threat.clone(),
        );
        let stats = StatisticsReader::new(store.clone(), clock.clone(), lists.clone(), threat.clone());
        let blacklist = TokenBlacklistStore::new(store.clone(), clock.clone(), tokens.access_ttl);
        let access = AccessTokenService::new(tokens.clone(), clock.clone(), blacklist);
        let refresh =
            RefreshTokenService::new(store.clone(), clock, tokens.clone(), access.clone());

        Ok(Self {
            store,
            policy,
            tokens,
            lists,
            threat,
            requests,
            logins,
            stats,
            access,
            refresh,
        })
    }

    /// Record a request from `ip`; `false` means it must be refused.
    pub async fn allow(&self, ip: &str, user_agent: Option<&str>) -> bool {
        self.requests.record_request(ip, user_agent).await
    }

    pub async fn record_login(&self, ip: &str, username: &str, success: bool) {
        self.logins.record_login_attempt(ip, username, success).await;
    }

    /// Delay to apply after a failed login from `ip`.
    pub async fn login_backoff(&self, ip: &str) -> Duration {
        self.logins.backoff(ip).await
    }

    /// # Errors
    /// Returns an error if the subject is blank or the token cannot be signed.
    pub fn issue_access_token(
        &self,
        subject: &str,
        authorities: &[String],
    ) -> Result<String, TokenError> {
        self.access.issue(subject, authorities)
    }

    pub async fn validate_access_token(&self, token: &str) -> bool {
        self.access.validate(token).await
    }

    /// # Errors
    /// Returns the reason the token is not acceptable.
    pub async fn inspect_access_token(
        &self,
        token: &str,
    ) -> Result<AccessTokenClaims, TokenRejection> {
        self.access.inspect(token).await
    }

    /// # Errors
    /// Returns an error if the revocation cannot be written.
    pub async fn revoke_access_token(&self, token: &str) -> Result<(), StoreError> {
        self.access.revoke(token).await
    }

    /// # Errors
    /// Returns an error if the principal is blank or the store cannot be written.
    pub async fn issue_refresh_token(
        &self,
        principal: &str,
        authorities: &[String],
    ) -> Result<String, Error> {
        self.refresh.issue(principal, authorities).await
    }

    pub async fn validate_refresh_token(&self, token: &str) -> Option<String> {
        self.refresh.validate(token).await
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn revoke_refresh_token(&self, token: &str) -> Result<bool, StoreError> {
        self.refresh.revoke(token).await
    }

    pub async fn refresh_access_token(&self, token: &str) -> Option<String> {
        self.refresh.refresh_access_token(token).await
    }

    /// Issue an access token and a refresh token for `subject`.
    ///
    /// # Errors
    /// Returns an error if either token cannot be issued.
    pub async fn issue_token_pair(
        &self,
        subject: &str,
        authorities: &[String],
    ) -> Result<TokenPair, Error> {
        let access_token = self.access.issue(subject, authorities)?;
        let refresh_token = self.refresh.issue(subject, authorities).await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_ttl.as_secs(),
        })
    }

    /// Drop the active refresh token of `principal`.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn revoke_all(&self, principal: &str) -> Result<bool, StoreError> {
        self.refresh.revoke_for_principal(principal).await
    }

    pub async fn statistics(&self, ip: &str) -> IpStatistics {
        self.stats.statistics(ip).await
    }

    /// Round trip to the store, used by health probes.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.exists(keys::HEALTH_PROBE).await.map(|_| ())
    }

    /// Lifetime of newly issued access tokens.
    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.tokens.access_ttl
    }

    #[must_use]
    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    #[must_use]
    pub fn lists(&self) -> &IpListStore {
        &self.lists
    }

    #[must_use]
    pub fn threat(&self) -> &ThreatScoreAccumulator {
        &self.threat
    }

    #[must_use]
    pub fn access_tokens(&self) -> &AccessTokenService {
        &self.access
    }

    #[must_use]
    pub fn refresh_tokens(&self) -> &RefreshTokenService {
        &self.refresh
    }
}
