use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::keys::{self, WindowKind};
use crate::store::TtlStore;
use crate::throttle::lists::IpListStore;
use crate::throttle::threat::ThreatScoreAccumulator;

/// Everything the store currently knows about one address.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IpStatistics {
    pub ip: String,
    pub requests_last_minute: u64,
    pub requests_last_hour: u64,
    pub requests_last_day: u64,
    pub login_attempts_last_hour: u64,
    pub failed_logins_last_hour: u64,
    pub distinct_user_agents: u64,
    pub distinct_usernames: u64,
    pub blacklisted: bool,
    pub whitelisted: bool,
    pub threat_score: f64,
}

impl IpStatistics {
    /// Statistics with every counter at zero, used when the store is unavailable.
    #[must_use]
    pub fn empty(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct StatisticsReader {
    store: Arc<dyn TtlStore>,
    clock: Arc<dyn Clock>,
    lists: IpListStore,
    threat: ThreatScoreAccumulator,
}

impl StatisticsReader {
    #[must_use]
    pub fn new(
        store: Arc<dyn TtlStore>,
        clock: Arc<dyn Clock>,
        lists: IpListStore,
        threat: ThreatScoreAccumulator,
    ) -> Self {
        Self {
            store,
            clock,
            lists,
            threat,
        }
    }

    pub async fn statistics(&self, ip: &str) -> IpStatistics {
        match self.read(ip).await {
            Ok(stats) => stats,
            Err(err) => {
                error!(ip, "failed to read address statistics: {err}");
                IpStatistics::empty(ip)
            }
        }
    }

    async fn read(&self, ip: &str) -> Result<IpStatistics, StoreError> {
        let now = self.clock.now();
        Ok(IpStatistics {
            ip: ip.to_string(),
            requests_last_minute: self
                .counter(&keys::request_counter(ip, WindowKind::Minute, now))
                .await?,
            requests_last_hour: self
                .counter(&keys::request_counter(ip, WindowKind::Hour, now))
                .await?,
            requests_last_day: self
                .counter(&keys::request_counter(ip, WindowKind::Day, now))
                .await?,
            login_attempts_last_hour: self.counter(&keys::login_counter(ip, now)).await?,
            failed_logins_last_hour: self.counter(&keys::login_failures(ip)).await?,
            distinct_user_agents: self.store.scard(&keys::user_agents(ip)).await?,
            distinct_usernames: self.store.scard(&keys::usernames(ip)).await?,
            blacklisted: self.lists.is_blacklisted(ip).await?,
            whitelisted: self.lists.is_whitelisted(ip).await?,
            threat_score: self.threat.score(ip).await?,
        })
    }

    async fn counter(&self, key: &str) -> Result<u64, StoreError> {
        match self.store.get(key).await? {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
            }),
        }
    }
}
