//! Per-address threat score and the detectors that feed it.
//!
//! Detectors are pure functions over a [`Snapshot`] of what the caller just
//! observed. Only [`ThreatScoreAccumulator`] touches the store: it adds the
//! signal's weight, slides the 24h TTL and blacklists the address once the
//! cumulative score goes above the threshold.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{keys, TtlStore};
use crate::throttle::lists::{IpListStore, HIGH_THREAT_SCORE};
use crate::throttle::policy::SecurityPolicy;

pub const THREAT_SCORE_TTL: Duration = Duration::from_secs(86_400);

// Repeated float additions can land a hair above the threshold (0.3 + 0.5 + 0.2).
const SCORE_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detector {
    UserAgentDiversity,
    MultiAccount,
    OffHours,
}

/// What the caller observed about an address during the current call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub distinct_user_agents: Option<u64>,
    pub distinct_usernames: Option<u64>,
    pub local_hour: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Signal {
    pub detector: Detector,
    pub delta: f64,
}

impl Signal {
    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.detector.reason()
    }
}

impl Detector {
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::UserAgentDiversity => "MULTIPLE_USER_AGENTS",
            Self::MultiAccount => "MULTIPLE_USER_ATTEMPTS",
            Self::OffHours => "OFF_HOURS_ACTIVITY",
        }
    }

    /// Returns a signal when the snapshot looks suspicious under `policy`.
    #[must_use]
    pub fn evaluate(self, snapshot: &Snapshot, policy: &SecurityPolicy) -> Option<Signal> {
        let threshold = u64::from(policy.suspicious_activity_threshold);
        let delta = match self {
            Self::UserAgentDiversity => snapshot
                .distinct_user_agents
                .filter(|count| *count > threshold)
                .map(|_| policy.weights.user_agent_diversity),
            Self::MultiAccount => snapshot
                .distinct_usernames
                .filter(|count| *count > threshold)
                .map(|_| policy.weights.multi_account),
            Self::OffHours => snapshot
                .local_hour
                .filter(|hour| !policy.is_business_hour(*hour))
                .map(|_| policy.weights.off_hours),
        }?;
        Some(Signal {
            detector: self,
            delta,
        })
    }
}

#[derive(Clone, Debug)]
pub struct ThreatScoreAccumulator {
    store: Arc<dyn TtlStore>,
    lists: IpListStore,
    threshold: f64,
}

impl ThreatScoreAccumulator {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>, lists: IpListStore, threshold: f64) -> Self {
        Self {
            store,
            lists,
            threshold,
        }
    }

    /// Add `delta` to the score of `ip` and blacklist it once the total exceeds the threshold.
    ///
    /// Returns the new cumulative score.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn increase(&self, ip: &str, delta: f64, reason: &str) -> Result<f64, StoreError> {
        let score = self
            .store
            .incr_by_float(&keys::threat_score(ip), delta, THREAT_SCORE_TTL)
            .await?;
        debug!(ip, delta, score, reason, "threat score increased");

        if self.exceeds_threshold(score) {
            warn!(ip, score, reason, "threat score above threshold");
            self.lists.blacklist_temporarily(ip, HIGH_THREAT_SCORE).await?;
        }
        Ok(score)
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn apply(&self, ip: &str, signal: &Signal) -> Result<f64, StoreError> {
        self.increase(ip, signal.delta, signal.reason()).await
    }

    /// Current score of `ip`, zero when nothing has been recorded.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached or the value is not a number.
    pub async fn score(&self, ip: &str) -> Result<f64, StoreError> {
        let key = keys::threat_score(ip);
        match self.store.get(&key).await? {
            None => Ok(0.0),
            Some(raw) => raw.parse().map_err(|_| StoreError::Corrupt { key }),
        }
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn clear(&self, ip: &str) -> Result<bool, StoreError> {
        self.store.del(&keys::threat_score(ip)).await
    }

    fn exceeds_threshold(&self, score: f64) -> bool {
        score - self.threshold > SCORE_EPSILON
    }
}
