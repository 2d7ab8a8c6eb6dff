//! Single-process [`TtlStore`] for local runs and tests.
//!
//! Expiry is evaluated lazily against the injected [`Clock`], so tests can move
//! time forward without sleeping.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::TtlStore;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;

#[derive(Debug)]
enum Value {
    Text(String),
    Set(HashSet<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Remaining lifetime of a key, `None` when it is missing or has no TTL.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.lock().await;
        let entry = entries.get(key).filter(|entry| entry.is_live(now))?;
        entry
            .expires_at
            .and_then(|at| (at - now).to_std().ok())
    }

    fn expiry(&self, ttl: Duration) -> DateTime<Utc> {
        let now = self.clock.now();
        ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: DateTime<Utc>) {
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
}

#[async_trait]
impl TtlStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, now);
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| self.expiry(ttl));
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, now);
        Ok(entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, now);
        Ok(entries.contains_key(key))
    }

    async fn sadd(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = self.clock.now();
        let expires_at = ttl.map(|ttl| self.expiry(ttl));
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, now);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        let Value::Set(members) = &mut entry.value else {
            return Err(StoreError::WrongType {
                key: key.to_string(),
            });
        };
        members.insert(member.to_string());
        if expires_at.is_some() {
            entry.expires_at = expires_at;
        }
        Ok(())
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, now);
        match entries.get(key) {
            None => Ok(0),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.len() as u64),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, now);
        match entries.get_mut(key) {
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Text("1".to_string()),
                        expires_at: Some(self.expiry(ttl)),
                    },
                );
                Ok(1)
            }
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => {
                let current: i64 = text.parse().map_err(|_| StoreError::WrongType {
                    key: key.to_string(),
                })?;
                let next = current.saturating_add(1);
                *text = next.to_string();
                Ok(next)
            }
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn incr_by_float(
        &self,
        key: &str,
        delta: f64,
        ttl: Duration,
    ) -> Result<f64, StoreError> {
        let now = self.clock.now();
        let expires_at = Some(self.expiry(ttl));
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, key, now);
        let current = match entries.get(key) {
            None => 0.0,
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => text.parse::<f64>().map_err(|_| StoreError::WrongType {
                key: key.to_string(),
            })?,
            Some(_) => {
                return Err(StoreError::WrongType {
                    key: key.to_string(),
                })
            }
        };
        let next = current + delta;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn store() -> (Arc<ManualClock>, MemoryStore) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).single().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = MemoryStore::new(clock.clone());
        (clock, store)
    }

    #[tokio::test]
    async fn ttl_is_only_set_when_the_counter_is_created() {
        let (clock, store) = store();
        assert_eq!(store.incr_with_ttl("c", Duration::from_secs(60)).await.unwrap(), 1);
        clock.advance(Duration::from_secs(40));
        assert_eq!(store.incr_with_ttl("c", Duration::from_secs(60)).await.unwrap(), 2);
        // The second increment must not have pushed the expiry out.
        clock.advance(Duration::from_secs(21));
        assert!(!store.exists("c").await.unwrap());
        assert_eq!(store.incr_with_ttl("c", Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let (_clock, store) = store();
        let store = Arc::new(store);

        let tasks: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.incr_with_ttl("c", Duration::from_secs(60)).await.unwrap()
                })
            })
            .collect();

        let mut seen = Vec::new();
        for task in tasks {
            seen.push(task.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=64).collect::<Vec<i64>>());
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("64"));
    }

    #[tokio::test]
    async fn values_without_ttl_persist() {
        let (clock, store) = store();
        store.set("k", "v", None).await.unwrap();
        clock.advance(Duration::from_secs(86_400 * 365));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.ttl("k").await, None);
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
    }

    #[tokio::test]
    async fn sets_refresh_their_ttl_on_insert() {
        let (clock, store) = store();
        let day = Duration::from_secs(86_400);
        store.sadd("s", "a", Some(day)).await.unwrap();
        clock.advance(Duration::from_secs(80_000));
        store.sadd("s", "b", Some(day)).await.unwrap();
        store.sadd("s", "b", Some(day)).await.unwrap();
        clock.advance(Duration::from_secs(80_000));
        assert_eq!(store.scard("s").await.unwrap(), 2);
        clock.advance(Duration::from_secs(10_000));
        assert_eq!(store.scard("s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn float_increments_accumulate_and_slide() {
        let (clock, store) = store();
        let day = Duration::from_secs(86_400);
        assert!((store.incr_by_float("t", 0.5, day).await.unwrap() - 0.5).abs() < 1e-12);
        clock.advance(Duration::from_secs(86_000));
        assert!((store.incr_by_float("t", 0.3, day).await.unwrap() - 0.8).abs() < 1e-12);
        clock.advance(Duration::from_secs(86_000));
        assert!(store.exists("t").await.unwrap());
    }

    #[tokio::test]
    async fn type_mismatches_are_reported() {
        let (_clock, store) = store();
        store.sadd("s", "a", None).await.unwrap();
        assert!(matches!(
            store.get("s").await,
            Err(StoreError::WrongType { .. })
        ));
        store.set("text", "abc", None).await.unwrap();
        assert!(matches!(
            store.incr_with_ttl("text", Duration::from_secs(1)).await,
            Err(StoreError::WrongType { .. })
        ));
    }
}
