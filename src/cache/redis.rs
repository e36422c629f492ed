// ABOUTME: Redis cache implementation with connection manager and TTL support
// ABOUTME: Provides distributed caching for multi-instance deployments
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

use super::{CacheConfig, CacheKey, CacheProvider};
use anyhow::{anyhow, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Namespace prefix for all cache keys
const KEY_PREFIX: &str = "switchboard:cache:";

/// Redis cache backend
///
/// Uses `ConnectionManager` for automatic reconnection. All keys carry the
/// `switchboard:cache:` prefix for namespace isolation; pattern invalidation
/// scans within that prefix.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to the Redis backend named by the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if no Redis URL is configured or the connection
    /// cannot be established.
    pub async fn new(config: &CacheConfig) -> Result<Self> {
        let redis_url = config
            .redis_url
            .as_ref()
            .ok_or_else(|| anyhow!("Redis URL is required for the Redis cache backend"))?;

        info!("Connecting to Redis cache backend at {}", redis_url);
        let client = redis::Client::open(redis_url.as_str())?;
        let manager = ConnectionManager::new(client).await?;
        info!("Redis cache backend connected");

        Ok(Self { manager })
    }

    fn namespaced(key: &CacheKey) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait::async_trait]
impl CacheProvider for RedisCache {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let serialized = serde_json::to_vec(value)?;
        let mut conn = self.manager.clone();
        let () = conn
            .set_ex(Self::namespaced(key), serialized, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> Result<Option<T>> {
        let mut conn = self.manager.clone();
        let data: Option<Vec<u8>> = conn.get(Self::namespaced(key)).await?;
        match data {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<()> {
        let mut conn = self.manager.clone();
        let () = conn.del(Self::namespaced(key)).await?;
        Ok(())
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.manager.clone();
        let scan_pattern = format!("{KEY_PREFIX}{pattern}");

        let mut removed = 0u64;
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>(&scan_pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        for key in keys {
            let deleted: u64 = conn.del(&key).await?;
            removed += deleted;
        }
        Ok(removed)
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.exists(Self::namespaced(key)).await?)
    }

    async fn ttl(&self, key: &CacheKey) -> Result<Option<Duration>> {
        let mut conn = self.manager.clone();
        let ttl_secs: i64 = conn.ttl(Self::namespaced(key)).await?;
        // Redis returns -2 for missing keys and -1 for keys without expiry
        if ttl_secs < 0 {
            return Ok(None);
        }
        #[allow(clippy::cast_sign_loss)]
        Ok(Some(Duration::from_secs(ttl_secs as u64)))
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(anyhow!("Unexpected PING response from Redis: {pong}"))
        }
    }
}
