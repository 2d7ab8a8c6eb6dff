//! Key builders for everything written to the store.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::time::Duration;

const IP_REQUEST_PREFIX: &str = "ip:req:";
const IP_LOGIN_PREFIX: &str = "ip:login:";
const IP_BLACKLIST_PREFIX: &str = "ip:blacklist:";
const IP_WHITELIST_PREFIX: &str = "ip:whitelist:";
const IP_STATS_PREFIX: &str = "ip:stats:";
const IP_THREAT_PREFIX: &str = "ip:threat:";
const TOKEN_BLACKLIST_PREFIX: &str = "jwt:blacklist:";
const REFRESH_TOKEN_PREFIX: &str = "jwt:refresh:";
const PRINCIPAL_REFRESH_PREFIX: &str = "jwt:user_refresh:";

/// Key read by health probes; never written.
pub const HEALTH_PROBE: &str = "warden:health";

/// Fixed time bucket a counter belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowKind {
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    #[must_use]
    pub const fn ttl(self) -> Duration {
        match self {
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3600),
            Self::Day => Duration::from_secs(86_400),
        }
    }

    const fn tag(self) -> &'static str {
        match self {
            Self::Minute => "min",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }

    fn bucket(self, now: DateTime<Utc>) -> String {
        let format = match self {
            Self::Minute => "%Y%m%d%H%M",
            Self::Hour => "%Y%m%d%H",
            Self::Day => "%Y%m%d",
        };
        now.format(format).to_string()
    }
}

#[must_use]
pub fn request_counter(ip: &str, window: WindowKind, now: DateTime<Utc>) -> String {
    format!(
        "{IP_REQUEST_PREFIX}{ip}:{}:{}",
        window.tag(),
        window.bucket(now)
    )
}

#[must_use]
pub fn login_counter(ip: &str, now: DateTime<Utc>) -> String {
    let window = WindowKind::Hour;
    format!(
        "{IP_LOGIN_PREFIX}{ip}:{}:{}",
        window.tag(),
        window.bucket(now)
    )
}

#[must_use]
pub fn blacklist(ip: &str) -> String {
    format!("{IP_BLACKLIST_PREFIX}{ip}")
}

#[must_use]
pub fn whitelist(ip: &str) -> String {
    format!("{IP_WHITELIST_PREFIX}{ip}")
}

#[must_use]
pub fn user_agents(ip: &str) -> String {
    format!("{IP_STATS_PREFIX}{ip}:ua")
}

#[must_use]
pub fn usernames(ip: &str) -> String {
    format!("{IP_STATS_PREFIX}{ip}:users")
}

#[must_use]
pub fn login_failures(ip: &str) -> String {
    format!("{IP_STATS_PREFIX}{ip}:failures")
}

#[must_use]
pub fn threat_score(ip: &str) -> String {
    format!("{IP_THREAT_PREFIX}{ip}")
}

#[must_use]
pub fn revoked_token(token: &str) -> String {
    format!("{TOKEN_BLACKLIST_PREFIX}{}", digest(token))
}

/// Key of the refresh token record addressed by the token digest.
#[must_use]
pub fn refresh_record(token_digest: &str) -> String {
    format!("{REFRESH_TOKEN_PREFIX}{token_digest}")
}

#[must_use]
pub fn principal_refresh(principal: &str) -> String {
    format!("{PRINCIPAL_REFRESH_PREFIX}{principal}")
}

/// URL-safe SHA-256 digest so raw bearer material never becomes a store key.
#[must_use]
pub fn digest(token: &str) -> String {
    let hash = Sha256::digest(token.as_bytes());
    Base64UrlUnpadded::encode_string(&hash)
}
