//! Runs against a live Redis only when `WARDEN_TEST_REDIS_URL` is set, e.g.
//! `WARDEN_TEST_REDIS_URL=redis://127.0.0.1:6379 cargo test --test redis_store`.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};
use ulid::Ulid;
use warden::store::{RedisStore, TtlStore};

async fn connect() -> Option<(Arc<RedisStore>, String)> {
    let url = std::env::var("WARDEN_TEST_REDIS_URL").ok()?;
    let store = RedisStore::connect(&url, Duration::from_secs(2))
        .await
        .unwrap();
    Some((Arc::new(store), format!("warden:test:{}", Ulid::new())))
}

#[tokio::test]
async fn counters_expire_from_their_first_increment() {
    let Some((store, prefix)) = connect().await else {
        return;
    };
    let key = format!("{prefix}:counter");
    assert_eq!(store.incr_with_ttl(&key, Duration::from_secs(1)).await.unwrap(), 1);
    assert_eq!(store.incr_with_ttl(&key, Duration::from_secs(60)).await.unwrap(), 2);

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert!(!store.exists(&key).await.unwrap());
    assert_eq!(store.incr_with_ttl(&key, Duration::from_secs(1)).await.unwrap(), 1);
    store.del(&key).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_are_not_lost() {
    let Some((store, prefix)) = connect().await else {
        return;
    };
    let key = format!("{prefix}:concurrent");

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                store.incr_with_ttl(&key, Duration::from_secs(60)).await.unwrap()
            })
        })
        .collect();
    let mut seen = Vec::new();
    for task in tasks {
        seen.push(task.await.unwrap());
    }
    seen.sort_unstable();
    assert_eq!(seen, (1..=50).collect::<Vec<i64>>());
    store.del(&key).await.unwrap();
}

#[tokio::test]
async fn scores_accumulate_and_slide() {
    let Some((store, prefix)) = connect().await else {
        return;
    };
    let key = format!("{prefix}:score");
    let first = store
        .incr_by_float(&key, 0.5, Duration::from_secs(1))
        .await
        .unwrap();
    let second = store
        .incr_by_float(&key, 0.3, Duration::from_secs(60))
        .await
        .unwrap();
    assert!((first - 0.5).abs() < 1e-9);
    assert!((second - 0.8).abs() < 1e-9);

    // The second call refreshed the TTL to a minute.
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert!(store.exists(&key).await.unwrap());
    store.del(&key).await.unwrap();
}

#[tokio::test]
async fn values_and_sets() {
    let Some((store, prefix)) = connect().await else {
        return;
    };
    let value = format!("{prefix}:value");
    let set = format!("{prefix}:set");

    store.set(&value, "v", Some(Duration::from_secs(60))).await.unwrap();
    assert_eq!(store.get(&value).await.unwrap().as_deref(), Some("v"));
    assert!(store.del(&value).await.unwrap());
    assert!(!store.del(&value).await.unwrap());
    assert_eq!(store.get(&value).await.unwrap(), None);

    for member in ["a", "b", "a"] {
        store
            .sadd(&set, member, Some(Duration::from_secs(60)))
            .await
            .unwrap();
    }
    assert_eq!(store.scard(&set).await.unwrap(), 2);
    assert_eq!(store.scard(&format!("{prefix}:missing")).await.unwrap(), 0);
    store.del(&set).await.unwrap();
}
