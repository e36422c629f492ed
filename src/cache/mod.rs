// ABOUTME: Response cache abstraction keyed by provider request fingerprints
// ABOUTME: Pluggable backend support (in-memory, Redis) behind one async trait
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Cache abstraction for expensive, idempotent provider responses.
//!
//! Keys are derived deterministically from `(provider, model, normalized
//! request payload)` so identical requests made concurrently or repeatedly
//! within the TTL window reuse the same cached value. This is the mechanism
//! that bounds language-model cost.
//!
//! The cache is best-effort by contract: callers must remain correct if the
//! backend is entirely absent. The cache-aside layer in
//! [`crate::llm::cached`] maps backend failures to misses.

/// Cache factory for creating cache backends
pub mod factory;
/// In-memory cache implementation
pub mod memory;
/// Redis cache implementation
pub mod redis;

use crate::constants;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Cache backend configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum entries held by the in-memory backend
    pub max_entries: usize,
    /// Redis connection URL; selects the Redis backend when set
    pub redis_url: Option<String>,
    /// Interval between expired-entry sweeps (in-memory backend)
    pub cleanup_interval: Duration,
    /// Spawn the background cleanup task (disable in tests)
    pub enable_background_cleanup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: constants::cache::DEFAULT_MAX_ENTRIES,
            redis_url: None,
            cleanup_interval: constants::cache::DEFAULT_CLEANUP_INTERVAL,
            enable_background_cleanup: true,
        }
    }
}

/// Deterministic cache key for one provider request
///
/// The fingerprint is a SHA-256 over the canonical JSON serialization of the
/// request payload. `serde_json` maps are ordered, so semantically identical
/// payloads fingerprint identically regardless of field construction order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Provider the response came from (e.g. `llm`)
    pub provider: String,
    /// Model or endpoint variant within the provider
    pub model: String,
    /// Hex-encoded SHA-256 of the normalized request payload
    pub fingerprint: String,
}

impl CacheKey {
    /// Derive a key from a normalized request payload
    #[must_use]
    pub fn for_payload(provider: &str, model: &str, payload: &serde_json::Value) -> Self {
        let canonical = payload.to_string();
        let digest = Sha256::digest(canonical.as_bytes());
        Self {
            provider: provider.to_owned(),
            model: model.to_owned(),
            fingerprint: hex::encode(digest),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.provider, self.model, self.fingerprint)
    }
}

/// Cache provider trait for pluggable backend implementations
#[async_trait::async_trait]
pub trait CacheProvider: Send + Sync {
    /// Store a value under `key` for at most `ttl`
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails.
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<()>;

    /// Fetch a value, returning `None` on miss or expiry
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read or deserialization fails.
    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &CacheKey) -> Result<Option<T>>;

    /// Remove a single entry
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete fails.
    async fn invalidate(&self, key: &CacheKey) -> Result<()>;

    /// Remove all entries whose rendered key matches a glob pattern
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is invalid or the backend scan fails.
    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64>;

    /// Whether a live entry exists for `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn exists(&self, key: &CacheKey) -> Result<bool>;

    /// Remaining TTL for `key`, or `None` when absent/expired
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn ttl(&self, key: &CacheKey) -> Result<Option<Duration>>;

    /// Verify the backend is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable.
    async fn health_check(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = CacheKey::for_payload("llm", "sonnet", &json!({"b": 2, "a": 1}));
        let b = CacheKey::for_payload("llm", "sonnet", &json!({"a": 1, "b": 2}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_varies_with_payload_and_model() {
        let base = CacheKey::for_payload("llm", "sonnet", &json!({"a": 1}));
        let other_payload = CacheKey::for_payload("llm", "sonnet", &json!({"a": 2}));
        let other_model = CacheKey::for_payload("llm", "haiku", &json!({"a": 1}));
        assert_ne!(base, other_payload);
        assert_ne!(base, other_model);
    }

    #[test]
    fn test_rendered_key_shape() {
        let key = CacheKey::for_payload("llm", "sonnet", &json!({}));
        let rendered = key.to_string();
        assert!(rendered.starts_with("llm:sonnet:"));
        assert_eq!(key.fingerprint.len(), 64);
    }
}
