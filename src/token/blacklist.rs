use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::{keys, TtlStore};

const REVOKED: &str = "revoked";

/// Ledger of revoked access tokens. Entries expire when the token would have.
#[derive(Clone, Debug)]
pub struct TokenBlacklistStore {
    store: Arc<dyn TtlStore>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl TokenBlacklistStore {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>, clock: Arc<dyn Clock>, default_ttl: Duration) -> Self {
        Self {
            store,
            clock,
            default_ttl,
        }
    }

    /// Revoke `token` until `expires_at`. Nothing is written if that moment has passed.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn add_until(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        let Ok(ttl) = (expires_at - self.clock.now()).to_std() else {
            debug!("token already expired, skipping revocation entry");
            return Ok(());
        };
        if ttl.is_zero() {
            return Ok(());
        }
        self.store
            .set(&keys::revoked_token(token), REVOKED, Some(ttl))
            .await
    }

    /// Revoke `token` for the default access token lifetime.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn add(&self, token: &str) -> Result<(), StoreError> {
        self.store
            .set(&keys::revoked_token(token), REVOKED, Some(self.default_ttl))
            .await
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn is_blacklisted(&self, token: &str) -> Result<bool, StoreError> {
        self.store.exists(&keys::revoked_token(token)).await
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn remove(&self, token: &str) -> Result<bool, StoreError> {
        self.store.del(&keys::revoked_token(token)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn ledger() -> (Arc<ManualClock>, TokenBlacklistStore) {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let ledger = TokenBlacklistStore::new(store, clock.clone(), Duration::from_secs(3600));
        (clock, ledger)
    }

    #[tokio::test]
    async fn entries_expire_with_the_token() {
        let (clock, ledger) = ledger();
        let expires_at = clock.now() + ChronoDuration::seconds(300);
        ledger.add_until("t1", expires_at).await.unwrap();
        assert!(ledger.is_blacklisted("t1").await.unwrap());
        clock.advance(Duration::from_secs(300));
        assert!(!ledger.is_blacklisted("t1").await.unwrap());
    }

    #[tokio::test]
    async fn past_expiry_writes_nothing() {
        let (clock, ledger) = ledger();
        let expires_at = clock.now() - ChronoDuration::seconds(1);
        ledger.add_until("t2", expires_at).await.unwrap();
        assert!(!ledger.is_blacklisted("t2").await.unwrap());
        ledger.add_until("t2", clock.now()).await.unwrap();
        assert!(!ledger.is_blacklisted("t2").await.unwrap());
    }

    #[tokio::test]
    async fn default_ttl_and_removal() {
        let (clock, ledger) = ledger();
        ledger.add("t3").await.unwrap();
        assert!(ledger.is_blacklisted("t3").await.unwrap());
        assert!(ledger.remove("t3").await.unwrap());
        assert!(!ledger.remove("t3").await.unwrap());

        ledger.add("t4").await.unwrap();
        clock.advance(Duration::from_secs(3600));
        assert!(!ledger.is_blacklisted("t4").await.unwrap());
    }
}
