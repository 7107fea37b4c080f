//! Redis-backed store shared by every service process.

use std::time::Duration;

use async_trait::async_trait;
use ::redis::aio::{ConnectionManager, ConnectionManagerConfig};
use ::redis::{AsyncCommands, RedisError};

use crate::config::StoreConfig;
use crate::store::{CacheStore, CounterStore, StoreError, StoreResult};

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        if e.kind() == ::redis::ErrorKind::TypeError {
            StoreError::Inconsistent(e.to_string())
        } else {
            StoreError::Unavailable(e.to_string())
        }
    }
}

/// Store speaking to a single Redis server.
///
/// `ConnectionManager` reconnects on its own. Every command is bounded by
/// the response timeout, so a server that is down or has stopped answering
/// fails with `StoreError::Unavailable` instead of blocking.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Open a managed connection to `url` (`redis://host:port/`).
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        response_timeout: Duration,
    ) -> StoreResult<Self> {
        let client = ::redis::Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid Redis URL: {}", e)))?;

        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(connect_timeout)
            .set_response_timeout(response_timeout);

        // The initial handshake gets both budgets; afterwards the manager
        // enforces them itself.
        let manager = tokio::time::timeout(
            connect_timeout + response_timeout,
            ConnectionManager::new_with_config(client, config),
        )
        .await
        .map_err(|_| StoreError::Unavailable("timed out connecting to Redis".to_string()))?
        .map_err(|e| StoreError::Unavailable(format!("failed to connect to Redis: {}", e)))?;

        Ok(Self { manager })
    }

    pub async fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Self::connect(
            &config.redis_url(),
            config.connect_timeout(),
            config.response_timeout(),
        )
        .await
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let count: i64 = self.conn().incr(key, 1).await?;
        Ok(count)
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> StoreResult<()> {
        let seconds = i64::try_from(seconds)
            .map_err(|_| StoreError::Inconsistent(format!("expiry {} out of range", seconds)))?;
        let _: () = self.conn().expire(key, seconds).await?;
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> StoreResult<i64> {
        let ttl: i64 = self.conn().ttl(key).await?;
        Ok(ttl)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value: Option<String> = self.conn().get(key).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let _: () = self.conn().set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
