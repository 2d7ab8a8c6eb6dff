//! Redis-backed [`TtlStore`].
//!
//! Every command is issued through a shared `ConnectionManager` (which reconnects
//! on its own) and bounded by the configured timeout, so callers never block on an
//! unhealthy Redis for longer than that.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::{fmt, future::Future, time::Duration};
use tracing::{info_span, Instrument};

use super::TtlStore;
use crate::error::StoreError;

// INCR and EXPIRE must run as one step, otherwise a crash between them leaves
// a counter that never expires.
const INCR_WITH_TTL: &str = r"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return current
";

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    timeout: Duration,
    incr_script: Script,
}

impl RedisStore {
    /// Open a managed connection to `url`.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the first connection cannot be
    /// established within `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let connection = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;

        Ok(Self {
            connection,
            timeout,
            incr_script: Script::new(INCR_WITH_TTL),
        })
    }

    async fn call<T, F>(&self, operation: &'static str, command: F) -> Result<T, StoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let span = info_span!(
            "store.call",
            store.system = "redis",
            store.operation = operation
        );
        match tokio::time::timeout(self.timeout, command.instrument(span)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl TtlStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        self.call("GET", async move {
            redis::cmd("GET").arg(key).query_async(&mut conn).await
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        self.call("SET", async move {
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(ttl_millis(ttl));
            }
            cmd.query_async(&mut conn).await
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let removed: i64 = self
            .call("DEL", async move {
                redis::cmd("DEL").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let found: i64 = self
            .call("EXISTS", async move {
                redis::cmd("EXISTS").arg(key).query_async(&mut conn).await
            })
            .await?;
        Ok(found > 0)
    }

    async fn sadd(&self, key: &str, member: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        self.call("SADD", async move {
            let mut pipe = redis::pipe();
            pipe.atomic().cmd("SADD").arg(key).arg(member).ignore();
            if let Some(ttl) = ttl {
                pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)).ignore();
            }
            pipe.query_async(&mut conn).await
        })
        .await
    }

    async fn scard(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        self.call("SCARD", async move {
            redis::cmd("SCARD").arg(key).query_async(&mut conn).await
        })
        .await
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        self.call("INCR_WITH_TTL", async move {
            self.incr_script
                .key(key)
                .arg(seconds)
                .invoke_async(&mut conn)
                .await
        })
        .await
    }

    async fn incr_by_float(
        &self,
        key: &str,
        delta: f64,
        ttl: Duration,
    ) -> Result<f64, StoreError> {
        let mut conn = self.connection.clone();
        let (score,): (f64,) = self
            .call("INCRBYFLOAT", async move {
                redis::pipe()
                    .atomic()
                    .cmd("INCRBYFLOAT")
                    .arg(key)
                    .arg(delta)
                    .cmd("PEXPIRE")
                    .arg(key)
                    .arg(ttl_millis(ttl))
                    .ignore()
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(score)
    }
}
