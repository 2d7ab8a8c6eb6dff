use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::keys::{self, WindowKind};
use crate::store::TtlStore;
use crate::throttle::lists::{IpListStore, LOGIN_ATTEMPTS_EXCEEDED};
use crate::throttle::policy::SecurityPolicy;
use crate::throttle::request::OBSERVATION_TTL;
use crate::throttle::threat::{Detector, Snapshot, ThreatScoreAccumulator};

pub const FAILURE_TTL: Duration = Duration::from_secs(3600);

/// Records login outcomes per address. It never blocks a login by itself; the
/// credential check is the gate, this only feeds counters and escalation.
#[derive(Clone, Debug)]
pub struct LoginAttemptGuard {
    store: Arc<dyn TtlStore>,
    clock: Arc<dyn Clock>,
    policy: Arc<SecurityPolicy>,
    lists: IpListStore,
    threat: ThreatScoreAccumulator,
}

impl LoginAttemptGuard {
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

    pub async fn record_login_attempt(&self, ip: &str, username: &str, success: bool) {
        if !self.policy.enable_ip_control {
            return;
        }
        if let Err(err) = self.record(ip, username, success).await {
            error!(ip, success, "failed to record login attempt: {err}");
        }
    }

    async fn record(&self, ip: &str, username: &str, success: bool) -> Result<(), StoreError> {
        let attempts = self
            .store
            .incr_with_ttl(&keys::login_counter(ip, self.clock.now()), WindowKind::Hour.ttl())
            .await?;

        let mut snapshot = Snapshot::default();
        let username = username.trim();
        if !username.is_empty() {
            let key = keys::usernames(ip);
            self.store
                .sadd(&key, username, Some(OBSERVATION_TTL))
                .await?;
            snapshot.distinct_usernames = Some(self.store.scard(&key).await?);
        }

        if !success {
            self.store
                .incr_with_ttl(&keys::login_failures(ip), FAILURE_TTL)
                .await?;

            if attempts > i64::from(self.policy.login_attempts_per_hour) {
                warn!(ip, attempts, "login attempts exceeded");
                self.lists
                    .blacklist_temporarily(ip, LOGIN_ATTEMPTS_EXCEEDED)
                    .await?;
            }
        }

        if self.policy.suspicious_activity_detection {
            if let Some(signal) = Detector::MultiAccount.evaluate(&snapshot, &self.policy) {
                self.threat.apply(ip, &signal).await?;
            }
        }
        Ok(())
    }

    /// Failed logins from `ip` in the current hour; zero when the store is unavailable.
    pub async fn failure_count(&self, ip: &str) -> u64 {
        match self.store.get(&keys::login_failures(ip)).await {
            Ok(value) => value
                .and_then(|raw| raw.parse::<u64>().ok())
                .unwrap_or_default(),
            Err(err) => {
                error!(ip, "failed to read login failures: {err}");
                0
            }
        }
    }

    /// Delay to apply before answering the next failed login from `ip`.
    pub async fn backoff(&self, ip: &str) -> Duration {
        self.policy.delay.delay(self.failure_count(ip).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    struct Fixture {
        clock: Arc<ManualClock>,
        lists: IpListStore,
        threat: ThreatScoreAccumulator,
        guard: LoginAttemptGuard,
    }

    fn fixture(policy: SecurityPolicy) -> Fixture {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let lists = IpListStore::new(store.clone(), clock.clone(), 60);
        let threat = ThreatScoreAccumulator::new(store.clone(), lists.clone(), 1.0);
        let guard = LoginAttemptGuard::new(
            store,
            clock.clone(),
            Arc::new(policy),
            lists.clone(),
            threat.clone(),
        );
        Fixture {
            clock,
            lists,
            threat,
            guard,
        }
    }

    #[tokio::test]
    async fn failures_beyond_the_hourly_limit_blacklist() {
        let f = fixture(SecurityPolicy::default().with_login_attempts_per_hour(2));
        for _ in 0..2 {
            f.guard.record_login_attempt("10.2.0.1", "alice", false).await;
        }
        assert!(!f.lists.is_blacklisted("10.2.0.1").await.unwrap());
        f.guard.record_login_attempt("10.2.0.1", "alice", false).await;
        let entry = f.lists.blacklist_entry("10.2.0.1").await.unwrap().unwrap();
        assert_eq!(entry.reason, LOGIN_ATTEMPTS_EXCEEDED);
    }

    #[tokio::test]
    async fn successful_logins_never_blacklist() {
        let f = fixture(SecurityPolicy::default().with_login_attempts_per_hour(1));
        for _ in 0..5 {
            f.guard.record_login_attempt("10.2.0.2", "alice", true).await;
        }
        assert!(!f.lists.is_blacklisted("10.2.0.2").await.unwrap());
        assert_eq!(f.guard.failure_count("10.2.0.2").await, 0);
    }

    #[tokio::test]
    async fn backoff_follows_the_failure_counter() {
        let f = fixture(SecurityPolicy::default());
        assert_eq!(f.guard.backoff("10.2.0.3").await, Duration::ZERO);
        for _ in 0..6 {
            f.guard.record_login_attempt("10.2.0.3", "bob", false).await;
        }
        assert_eq!(f.guard.failure_count("10.2.0.3").await, 6);
        assert_eq!(f.guard.backoff("10.2.0.3").await, Duration::from_secs(32));

        f.clock.advance(FAILURE_TTL);
        assert_eq!(f.guard.failure_count("10.2.0.3").await, 0);
    }

    #[tokio::test]
    async fn many_usernames_from_one_address_are_suspicious() {
        let f = fixture(SecurityPolicy::default());
        for user in ["a", "b", "c", "d", "e"] {
            f.guard.record_login_attempt("10.2.0.4", user, true).await;
        }
        // The fourth and fifth distinct usernames each add 0.5.
        let score = f.threat.score("10.2.0.4").await.unwrap();
        assert!((score - 1.0).abs() < 1e-9);
        assert!(!f.lists.is_blacklisted("10.2.0.4").await.unwrap());

        f.guard.record_login_attempt("10.2.0.4", "f", true).await;
        let entry = f.lists.blacklist_entry("10.2.0.4").await.unwrap().unwrap();
        assert_eq!(entry.reason, crate::throttle::lists::HIGH_THREAT_SCORE);
    }

    #[tokio::test]
    async fn blank_usernames_are_not_collected() {
        let f = fixture(SecurityPolicy::default());
        for _ in 0..5 {
            f.guard.record_login_attempt("10.2.0.5", "  ", true).await;
        }
        assert!(f.threat.score("10.2.0.5").await.unwrap().abs() < f64::EPSILON);
    }
}
