//! Tunables for request throttling and abuse detection.

use std::net::IpAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::throttle::delay::ProgressiveDelay;

/// Weight each detector adds to an address' threat score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThreatWeights {
    pub user_agent_diversity: f64,
    pub multi_account: f64,
    pub off_hours: f64,
}

impl Default for ThreatWeights {
    fn default() -> Self {
        Self {
            user_agent_diversity: 0.3,
            multi_account: 0.5,
            off_hours: 0.2,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SecurityPolicy {
    pub enable_ip_control: bool,
    pub rate_limit_per_minute: u32,
    pub login_attempts_per_hour: u32,
    /// Minutes an automatic blacklist entry lives; zero or less is permanent.
    pub blacklist_duration_minutes: i64,
    pub suspicious_activity_detection: bool,
    pub suspicious_activity_threshold: u32,
    pub user_agent_detection: bool,
    pub delay: ProgressiveDelay,
    pub threat_threshold: f64,
    pub weights: ThreatWeights,
    /// First local hour considered normal activity.
    pub business_hours_start: u32,
    /// Last local hour considered normal activity (inclusive).
    pub business_hours_end: u32,
    /// Peers whose `X-Forwarded-For`/`X-Real-IP` headers are believed; empty trusts any peer.
    pub trusted_proxies: Vec<IpAddr>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self {
            enable_ip_control: true,
            rate_limit_per_minute: 100,
            login_attempts_per_hour: 20,
            blacklist_duration_minutes: 60,
            suspicious_activity_detection: true,
            suspicious_activity_threshold: 3,
            user_agent_detection: true,
            delay: ProgressiveDelay::default(),
            threat_threshold: 1.0,
            weights: ThreatWeights::default(),
            business_hours_start: 8,
            business_hours_end: 22,
            trusted_proxies: Vec::new(),
        }
    }
}

impl SecurityPolicy {
    #[must_use]
    pub fn with_ip_control(mut self, enabled: bool) -> Self {
        self.enable_ip_control = enabled;
        self
    }

    #[must_use]
    pub fn with_rate_limit_per_minute(mut self, limit: u32) -> Self {
        self.rate_limit_per_minute = limit;
        self
    }

    #[must_use]
    pub fn with_login_attempts_per_hour(mut self, limit: u32) -> Self {
        self.login_attempts_per_hour = limit;
        self
    }

    #[must_use]
    pub fn with_blacklist_duration_minutes(mut self, minutes: i64) -> Self {
        self.blacklist_duration_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_suspicious_activity_detection(mut self, enabled: bool) -> Self {
        self.suspicious_activity_detection = enabled;
        self
    }

    #[must_use]
    pub fn with_suspicious_activity_threshold(mut self, threshold: u32) -> Self {
        self.suspicious_activity_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_user_agent_detection(mut self, enabled: bool) -> Self {
        self.user_agent_detection = enabled;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: ProgressiveDelay) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_threat_threshold(mut self, threshold: f64) -> Self {
        self.threat_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_weights(mut self, weights: ThreatWeights) -> Self {
        self.weights = weights;
        self
    }

    #[must_use]
    pub fn with_business_hours(mut self, start: u32, end: u32) -> Self {
        self.business_hours_start = start;
        self.business_hours_end = end;
        self
    }

    #[must_use]
    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies.into_iter().map(|ip| ip.to_canonical()).collect();
        self
    }

    /// Whether forwarded client headers sent by `peer` may be used.
    #[must_use]
    pub fn trusts_forwarded_headers(&self, peer: Option<IpAddr>) -> bool {
        self.trusted_proxies.is_empty()
            || peer.is_some_and(|peer| self.trusted_proxies.contains(&peer.to_canonical()))
    }

    /// TTL for automatic blacklist entries, `None` when they are permanent.
    #[must_use]
    pub fn blacklist_ttl(&self) -> Option<Duration> {
        minutes_to_ttl(self.blacklist_duration_minutes)
    }

    #[must_use]
    pub fn is_business_hour(&self, hour: u32) -> bool {
        (self.business_hours_start..=self.business_hours_end).contains(&hour)
    }

    /// # Errors
    /// Returns the first invalid field found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::NotPositive("ip_rate_limit_per_minute"));
        }
        if self.login_attempts_per_hour == 0 {
            return Err(ConfigError::NotPositive("ip_login_attempts_per_hour"));
        }
        if self.suspicious_activity_threshold == 0 {
            return Err(ConfigError::NotPositive("suspicious_activity_threshold"));
        }
        if !(self.threat_threshold.is_finite() && self.threat_threshold > 0.0) {
            return Err(ConfigError::NotPositive("threat_score_threshold"));
        }
        if self.business_hours_start > self.business_hours_end || self.business_hours_end > 23 {
            return Err(ConfigError::BusinessHours {
                start: self.business_hours_start,
                end: self.business_hours_end,
            });
        }
        self.delay.validate()
    }
}

/// Minutes to a store TTL; zero or negative means no expiry.
pub(crate) fn minutes_to_ttl(minutes: i64) -> Option<Duration> {
    u64::try_from(minutes)
        .ok()
        .filter(|minutes| *minutes > 0)
        .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let policy = SecurityPolicy::default();
        assert_eq!(policy.validate(), Ok(()));
        assert_eq!(policy.blacklist_ttl(), Some(Duration::from_secs(3600)));
        assert!((policy.weights.user_agent_diversity - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn non_positive_durations_are_permanent() {
        assert_eq!(minutes_to_ttl(0), None);
        assert_eq!(minutes_to_ttl(-5), None);
        assert_eq!(minutes_to_ttl(2), Some(Duration::from_secs(120)));
    }

    #[test]
    fn business_hours_are_inclusive() {
        let policy = SecurityPolicy::default();
        assert!(policy.is_business_hour(8));
        assert!(policy.is_business_hour(22));
        assert!(!policy.is_business_hour(7));
        assert!(!policy.is_business_hour(23));
    }

    #[test]
    fn forwarded_headers_follow_the_proxy_list() {
        let open = SecurityPolicy::default();
        assert!(open.trusts_forwarded_headers(None));
        assert!(open.trusts_forwarded_headers("203.0.113.9".parse().ok()));

        let proxy = IpAddr::from([10, 0, 0, 1]);
        let strict = SecurityPolicy::default().with_trusted_proxies(vec![proxy]);
        assert!(strict.trusts_forwarded_headers(Some(proxy)));
        // Dual-stack listeners report IPv4 peers as mapped addresses.
        assert!(strict.trusts_forwarded_headers("::ffff:10.0.0.1".parse().ok()));
        assert!(!strict.trusts_forwarded_headers("10.0.0.2".parse().ok()));
        assert!(!strict.trusts_forwarded_headers(None));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert_eq!(
            SecurityPolicy::default()
                .with_rate_limit_per_minute(0)
                .validate(),
            Err(ConfigError::NotPositive("ip_rate_limit_per_minute"))
        );
        assert_eq!(
            SecurityPolicy::default().with_business_hours(22, 8).validate(),
            Err(ConfigError::BusinessHours { start: 22, end: 8 })
        );
        assert_eq!(
            SecurityPolicy::default()
                .with_threat_threshold(f64::NAN)
                .validate(),
            Err(ConfigError::NotPositive("threat_score_threshold"))
        );
    }
}
