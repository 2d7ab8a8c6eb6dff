use std::sync::Arc;
use tracing::{error, warn};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::keys::{self, WindowKind};
use crate::store::TtlStore;
use crate::throttle::lists::{IpListStore, RATE_LIMIT_EXCEEDED};
use crate::throttle::policy::SecurityPolicy;
use crate::throttle::threat::{Detector, Snapshot, ThreatScoreAccumulator};

/// TTL of the per-address user agent and username sets.
pub const OBSERVATION_TTL: std::time::Duration = std::time::Duration::from_secs(86_400);

/// Per-address request gate.
#[derive(Clone, Debug)]
pub struct RequestThrottle {
    store: Arc<dyn TtlStore>,
    clock: Arc<dyn Clock>,
    policy: Arc<SecurityPolicy>,
    lists: IpListStore,
    threat: ThreatScoreAccumulator,
}

impl RequestThrottle {
    #[must_use]
    pub fn new(
        store: Arc<dyn TtlStore>,
        clock: Arc<dyn Clock>,
        policy: Arc<SecurityPolicy>,
        lists: IpListStore,
        threat: ThreatScoreAccumulator,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            lists,
            threat,
        }
    }

    /// Record a request from `ip` and decide whether it may proceed.
    ///
    /// Store failures allow the request.
    pub async fn record_request(&self, ip: &str, user_agent: Option<&str>) -> bool {
        if !self.policy.enable_ip_control {
            return true;
        }
        match self.check(ip, user_agent).await {
            Ok(allowed) => allowed,
            Err(err) => {
                error!(ip, "request throttle unavailable, allowing request: {err}");
                true
            }
        }
    }

    async fn check(&self, ip: &str, user_agent: Option<&str>) -> Result<bool, StoreError> {
        if self.lists.is_whitelisted(ip).await? {
            return Ok(true);
        }
        if self.lists.is_blacklisted(ip).await? {
            warn!(ip, "request from blacklisted address");
            return Ok(false);
        }

        let now = self.clock.now();
        let minute = keys::request_counter(ip, WindowKind::Minute, now);
        let count = self
            .store
            .incr_with_ttl(&minute, WindowKind::Minute.ttl())
            .await?;
        if count > i64::from(self.policy.rate_limit_per_minute) {
            warn!(ip, count, "rate limit exceeded");
            self.lists
                .blacklist_temporarily(ip, RATE_LIMIT_EXCEEDED)
                .await?;
            return Ok(false);
        }

        for window in [WindowKind::Hour, WindowKind::Day] {
            self.store
                .incr_with_ttl(&keys::request_counter(ip, window, now), window.ttl())
                .await?;
        }

        let mut snapshot = Snapshot::default();
        if self.policy.user_agent_detection {
            if let Some(agent) = user_agent.filter(|agent| !agent.trim().is_empty()) {
                let key = keys::user_agents(ip);
                self.store.sadd(&key, agent, Some(OBSERVATION_TTL)).await?;
                snapshot.distinct_user_agents = Some(self.store.scard(&key).await?);
            }
        }

        if self.policy.suspicious_activity_detection {
            snapshot.local_hour = Some(self.clock.local_hour());
            self.detect(ip, &snapshot).await;
        }

        Ok(true)
    }

    // Detector failures are logged and never change the outcome of this request.
    async fn detect(&self, ip: &str, snapshot: &Snapshot) {
        for detector in [Detector::UserAgentDiversity, Detector::OffHours] {
            let Some(signal) = detector.evaluate(snapshot, &self.policy) else {
                continue;
            };
            if let Err(err) = self.threat.apply(ip, &signal).await {
                error!(ip, reason = signal.reason(), "failed to record threat signal: {err}");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
        lists: IpListStore,
        threat: ThreatScoreAccumulator,
        throttle: RequestThrottle,
    }

    fn fixture(policy: SecurityPolicy) -> Fixture {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let lists = IpListStore::new(store.clone(), clock.clone(), 60);
        let threat = ThreatScoreAccumulator::new(store.clone(), lists.clone(), 1.0);
        let throttle = RequestThrottle::new(
            store.clone(),
            clock.clone(),
            Arc::new(policy),
            lists.clone(),
            threat.clone(),
        );
        Fixture {
            clock,
            store,
            lists,
            threat,
            throttle,
        }
    }

    #[tokio::test]
    async fn limit_plus_one_is_denied_and_blacklisted() {
        let f = fixture(SecurityPolicy::default().with_rate_limit_per_minute(3));
        for _ in 0..3 {
            assert!(f.throttle.record_request("10.0.0.1", None).await);
        }
        assert!(!f.throttle.record_request("10.0.0.1", None).await);
        let entry = f.lists.blacklist_entry("10.0.0.1").await.unwrap().unwrap();
        assert_eq!(entry.reason, RATE_LIMIT_EXCEEDED);

        // Still blocked in the next window because of the blacklist entry.
        f.clock.advance(Duration::from_secs(60));
        assert!(!f.throttle.record_request("10.0.0.1", None).await);
    }

    #[tokio::test]
    async fn whitelist_skips_every_counter() {
        let f = fixture(SecurityPolicy::default().with_rate_limit_per_minute(1));
        f.lists.whitelist("10.0.0.2", "office").await.unwrap();
        f.lists.blacklist("10.0.0.2", "manual", 0).await.unwrap();
        for _ in 0..10 {
            assert!(f.throttle.record_request("10.0.0.2", Some("curl")).await);
        }
        let minute = keys::request_counter("10.0.0.2", WindowKind::Minute, f.clock.now());
        assert!(!f.store.exists(&minute).await.unwrap());
    }

    #[tokio::test]
    async fn hour_and_day_counters_follow_the_minute_counter() {
        let f = fixture(SecurityPolicy::default());
        assert!(f.throttle.record_request("10.0.0.3", None).await);
        let now = f.clock.now();
        for window in [WindowKind::Minute, WindowKind::Hour, WindowKind::Day] {
            let key = keys::request_counter("10.0.0.3", window, now);
            assert_eq!(f.store.get(&key).await.unwrap().as_deref(), Some("1"));
        }
    }

    #[tokio::test]
    async fn user_agent_diversity_raises_the_threat_score() {
        let f = fixture(SecurityPolicy::default());
        for agent in ["a", "b", "c", "d"] {
            assert!(f.throttle.record_request("10.0.0.4", Some(agent)).await);
        }
        let score = f.threat.score("10.0.0.4").await.unwrap();
        assert!((score - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn off_hours_are_scored_once_per_request() {
        let f = fixture(SecurityPolicy::default());
        f.clock
            .set(Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).single().unwrap());
        assert!(f.throttle.record_request("10.0.0.5", None).await);
        assert!(f.throttle.record_request("10.0.0.5", None).await);
        let score = f.threat.score("10.0.0.5").await.unwrap();
        assert!((score - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn disabled_ip_control_allows_everything() {
        let f = fixture(
            SecurityPolicy::default()
                .with_ip_control(false)
                .with_rate_limit_per_minute(1),
        );
        f.lists.blacklist("10.0.0.6", "manual", 0).await.unwrap();
        assert!(f.throttle.record_request("10.0.0.6", None).await);
        assert!(f.throttle.record_request("10.0.0.6", None).await);
    }
}
