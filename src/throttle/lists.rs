//! Blacklist and whitelist overlays keyed by source address.
//!
//! Both lists store a small JSON record so operators can see why and when an
//! address was listed. Blacklist entries may expire; whitelist entries never do.
//! Callers that consult both must check the whitelist first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::{keys, TtlStore};
use crate::throttle::policy::minutes_to_ttl;

pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
pub const LOGIN_ATTEMPTS_EXCEEDED: &str = "LOGIN_ATTEMPTS_EXCEEDED";
pub const HIGH_THREAT_SCORE: &str = "HIGH_THREAT_SCORE";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ListEntry {
    pub ip_address: String,
    pub reason: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct IpListStore {
    store: Arc<dyn TtlStore>,
    clock: Arc<dyn Clock>,
    default_duration_minutes: i64,
}

impl IpListStore {
    #[must_use]
    pub fn new(
        store: Arc<dyn TtlStore>,
        clock: Arc<dyn Clock>,
        default_duration_minutes: i64,
    ) -> Self {
        Self {
            store,
            clock,
            default_duration_minutes,
        }
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn is_blacklisted(&self, ip: &str) -> Result<bool, StoreError> {
        self.store.exists(&keys::blacklist(ip)).await
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn is_whitelisted(&self, ip: &str) -> Result<bool, StoreError> {
        self.store.exists(&keys::whitelist(ip)).await
    }

    /// Blacklist `ip` for `duration_minutes`; zero or less keeps it until removed.
    ///
    /// # Errors
    /// Returns an error if the entry cannot be written.
    pub async fn blacklist(
        &self,
        ip: &str,
        reason: &str,
        duration_minutes: i64,
    ) -> Result<(), StoreError> {
        let entry = self.entry(ip, reason);
        let ttl = minutes_to_ttl(duration_minutes);
        self.store
            .set(&keys::blacklist(ip), &encode(&entry, ip)?, ttl)
            .await?;
        warn!(ip, reason, duration_minutes, "address blacklisted");
        Ok(())
    }

    /// Blacklist `ip` for the configured default duration.
    ///
    /// # Errors
    /// Returns an error if the entry cannot be written.
    pub async fn blacklist_temporarily(&self, ip: &str, reason: &str) -> Result<(), StoreError> {
        self.blacklist(ip, reason, self.default_duration_minutes)
            .await
    }

    /// # Errors
    /// Returns an error if the entry cannot be written.
    pub async fn whitelist(&self, ip: &str, reason: &str) -> Result<(), StoreError> {
        let entry = self.entry(ip, reason);
        self.store
            .set(&keys::whitelist(ip), &encode(&entry, ip)?, None)
            .await?;
        info!(ip, reason, "address whitelisted");
        Ok(())
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn remove_from_blacklist(&self, ip: &str) -> Result<bool, StoreError> {
        let removed = self.store.del(&keys::blacklist(ip)).await?;
        if removed {
            info!(ip, "address removed from blacklist");
        }
        Ok(removed)
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn remove_from_whitelist(&self, ip: &str) -> Result<bool, StoreError> {
        let removed = self.store.del(&keys::whitelist(ip)).await?;
        if removed {
            info!(ip, "address removed from whitelist");
        }
        Ok(removed)
    }

    /// # Errors
    /// Returns an error if the store cannot be reached or the record is unreadable.
    pub async fn blacklist_entry(&self, ip: &str) -> Result<Option<ListEntry>, StoreError> {
        self.read(&keys::blacklist(ip)).await
    }

    /// # Errors
    /// Returns an error if the store cannot be reached or the record is unreadable.
    pub async fn whitelist_entry(&self, ip: &str) -> Result<Option<ListEntry>, StoreError> {
        self.read(&keys::whitelist(ip)).await
    }

    fn entry(&self, ip: &str, reason: &str) -> ListEntry {
        ListEntry {
            ip_address: ip.to_string(),
            reason: reason.to_string(),
            added_at: self.clock.now(),
        }
    }

    async fn read(&self, key: &str) -> Result<Option<ListEntry>, StoreError> {
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

fn encode(entry: &ListEntry, ip: &str) -> Result<String, StoreError> {
    serde_json::to_string(entry).map_err(|_| StoreError::Corrupt {
        key: keys::blacklist(ip),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::time::Duration;

    fn lists() -> (Arc<ManualClock>, Arc<MemoryStore>, IpListStore) {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let lists = IpListStore::new(store.clone(), clock.clone(), 60);
        (clock, store, lists)
    }

    #[tokio::test]
    async fn temporary_blacklist_expires_on_its_own() {
        let (clock, _store, lists) = lists();
        lists
            .blacklist_temporarily("10.0.0.9", RATE_LIMIT_EXCEEDED)
            .await
            .unwrap();
        assert!(lists.is_blacklisted("10.0.0.9").await.unwrap());

        let entry = lists.blacklist_entry("10.0.0.9").await.unwrap().unwrap();
        assert_eq!(entry.reason, RATE_LIMIT_EXCEEDED);
        assert_eq!(entry.ip_address, "10.0.0.9");
        assert_eq!(entry.added_at, clock.now());

        clock.advance(Duration::from_secs(59 * 60));
        assert!(lists.is_blacklisted("10.0.0.9").await.unwrap());
        clock.advance(Duration::from_secs(60));
        assert!(!lists.is_blacklisted("10.0.0.9").await.unwrap());
    }

    #[tokio::test]
    async fn zero_duration_is_permanent() {
        let (clock, _store, lists) = lists();
        lists.blacklist("10.0.0.1", "manual", 0).await.unwrap();
        clock.advance(Duration::from_secs(86_400 * 30));
        assert!(lists.is_blacklisted("10.0.0.1").await.unwrap());
        assert!(lists.remove_from_blacklist("10.0.0.1").await.unwrap());
        assert!(!lists.remove_from_blacklist("10.0.0.1").await.unwrap());
    }

    #[tokio::test]
    async fn lists_are_independent() {
        let (_clock, _store, lists) = lists();
        lists.whitelist("10.0.0.2", "office").await.unwrap();
        assert!(lists.is_whitelisted("10.0.0.2").await.unwrap());
        assert!(!lists.is_blacklisted("10.0.0.2").await.unwrap());
        assert!(lists.whitelist_entry("10.0.0.3").await.unwrap().is_none());
        assert!(!lists.remove_from_blacklist("10.0.0.2").await.unwrap());
        assert!(lists.remove_from_whitelist("10.0.0.2").await.unwrap());
    }

    #[tokio::test]
    async fn unreadable_entries_are_reported() {
        let (_clock, store, lists) = lists();
        store
            .set(&keys::blacklist("10.0.0.4"), "not json", None)
            .await
            .unwrap();
        assert!(lists.is_blacklisted("10.0.0.4").await.unwrap());
        assert!(matches!(
            lists.blacklist_entry("10.0.0.4").await,
            Err(StoreError::Corrupt { .. })
        ));
    }
}
