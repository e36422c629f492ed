// ABOUTME: Cache factory for configuration-based backend selection
// ABOUTME: Dispatches to in-memory or Redis backends behind one concrete type
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

use super::{memory::InMemoryCache, redis::RedisCache, CacheConfig, CacheKey, CacheProvider};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Unified cache handle over the configured backend
#[derive(Clone)]
pub enum Cache {
    /// Process-local LRU cache
    Memory(InMemoryCache),
    /// Shared Redis cache for multi-instance deployments
    Redis(RedisCache),
}

impl Cache {
    /// Create a cache instance based on configuration
    ///
    /// A configured `redis_url` selects the Redis backend; otherwise the
    /// in-memory backend is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the selected backend fails to initialize.
    pub async fn new(config: CacheConfig) -> Result<Self> {
        if config.redis_url.is_some() {
            tracing::info!("Initializing Redis cache backend");
            Ok(Self::Redis(RedisCache::new(&config).await?))
        } else {
            tracing::info!(
                "Initializing in-memory cache (max entries: {})",
                config.max_entries
            );
            Ok(Self::Memory(InMemoryCache::new(&config)))
        }
    }

    /// Short backend name for logs and health reports
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
        }
    }
}

#[async_trait::async_trait]
impl CacheProvider for Cache {
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        match self {
            Self::Memory(cache) => cache.set(key, value, ttl).await,
            Self::Redis(cache) => cache.set(key, value, ttl).await,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> Result<Option<T>> {
        match self {
            Self::Memory(cache) => cache.get(key).await,
            Self::Redis(cache) => cache.get(key).await,
        }
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<()> {
        match self {
            Self::Memory(cache) => cache.invalidate(key).await,
            Self::Redis(cache) => cache.invalidate(key).await,
        }
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        match self {
            Self::Memory(cache) => cache.invalidate_pattern(pattern).await,
            Self::Redis(cache) => cache.invalidate_pattern(pattern).await,
        }
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        match self {
            Self::Memory(cache) => cache.exists(key).await,
            Self::Redis(cache) => cache.exists(key).await,
        }
    }

    async fn ttl(&self, key: &CacheKey) -> Result<Option<Duration>> {
        match self {
            Self::Memory(cache) => cache.ttl(key).await,
            Self::Redis(cache) => cache.ttl(key).await,
        }
    }

    async fn health_check(&self) -> Result<()> {
        match self {
            Self::Memory(cache) => cache.health_check().await,
            Self::Redis(cache) => cache.health_check().await,
        }
    }
}
