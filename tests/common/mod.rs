#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use warden::{
    clock::ManualClock,
    store::{MemoryStore, TtlStore},
    throttle::SecurityPolicy,
    token::TokenConfig,
    StoreError, Warden,
};

pub const SECRET: &str = "0123456789abcdef0123456789abcdef";

/// A store whose every call times out.
#[derive(Debug, Default)]
pub struct FailingStore;

fn unavailable() -> StoreError {
    StoreError::Timeout(Duration::from_millis(250))
}

#[async_trait]
impl TtlStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(unavailable())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn del(&self, _key: &str) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    async fn sadd(&self, _key: &str, _member: &str, _ttl: Option<Duration>) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn scard(&self, _key: &str) -> Result<u64, StoreError> {
        Err(unavailable())
    }

    async fn incr_with_ttl(&self, _key: &str, _ttl: Duration) -> Result<i64, StoreError> {
        Err(unavailable())
    }

    async fn incr_by_float(&self, _key: &str, _delta: f64, _ttl: Duration) -> Result<f64, StoreError> {
        Err(unavailable())
    }
}

pub fn tokens() -> TokenConfig {
    TokenConfig::new(SecretString::from(SECRET.to_string()))
}

/// Noon UTC, inside the default business hours.
pub fn clock() -> Arc<ManualClock> {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().unwrap();
    Arc::new(ManualClock::new(start))
}

pub fn warden_with(policy: SecurityPolicy, tokens: TokenConfig) -> (Arc<ManualClock>, Warden) {
    let clock = clock();
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let warden = Warden::new(store, clock.clone(), policy, tokens).unwrap();
    (clock, warden)
}

pub fn warden(policy: SecurityPolicy) -> (Arc<ManualClock>, Warden) {
    warden_with(policy, tokens())
}

pub fn failing_warden(policy: SecurityPolicy) -> Warden {
    Warden::new(Arc::new(FailingStore), clock(), policy, tokens()).unwrap()
}
