// ABOUTME: Cache-aside chat client combining the response cache and resilient executor
// ABOUTME: Best-effort caching; callers stay correct when the cache backend is absent
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Cached chat completions.
//!
//! Every LLM call in the system goes through [`CachedChatClient`]: the
//! request is fingerprinted, the cache consulted, and only on a miss does
//! the resilient executor invoke the provider. Cache failures are never
//! surfaced - a failed read is a miss and a failed write is logged and
//! swallowed, so a dead cache backend degrades cost, not correctness.

use super::{ChatProvider, ChatRequest, ChatResponse, LlmProvider};
use crate::cache::factory::Cache;
use crate::cache::{CacheKey, CacheProvider};
use crate::errors::AppResult;
use crate::executor::CallExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Chat client wrapping the provider with caching and retries
#[derive(Clone)]
pub struct CachedChatClient {
    provider: Arc<ChatProvider>,
    cache: Arc<Cache>,
    executor: Arc<CallExecutor>,
    ttl: Duration,
}

impl CachedChatClient {
    /// Assemble the client from injected collaborators
    #[must_use]
    pub fn new(
        provider: Arc<ChatProvider>,
        cache: Arc<Cache>,
        executor: Arc<CallExecutor>,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            executor,
            ttl,
        }
    }

    fn key_for(&self, request: &ChatRequest) -> (String, CacheKey) {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_owned());
        let key = CacheKey::for_payload(
            self.provider.name(),
            &model,
            &request.normalized_payload(&model),
        );
        (model, key)
    }

    /// Complete a chat request, serving identical requests from cache
    ///
    /// # Errors
    ///
    /// Returns an error only when the provider call fails after the
    /// executor's retry budget; cache unavailability is not an error.
    pub async fn complete(&self, request: &ChatRequest) -> AppResult<ChatResponse> {
        let (model, key) = self.key_for(request);

        match self.cache.get::<ChatResponse>(&key).await {
            Ok(Some(cached)) => {
                debug!(model = %model, "Serving chat completion from cache");
                return Ok(cached);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Cache read failed, treating as miss");
            }
        }

        let provider = self.provider.clone();
        let response = self
            .executor
            .execute("llm.complete", || {
                let provider = provider.clone();
                async move { provider.complete(request).await }
            })
            .await?;

        if let Err(e) = self.cache.set(&key, &response, self.ttl).await {
            warn!(error = %e, "Cache write failed, continuing without caching");
        }

        Ok(response)
    }

    /// Explicitly invalidate the cached response for a request
    pub async fn invalidate(&self, request: &ChatRequest) {
        let (_, key) = self.key_for(request);
        if let Err(e) = self.cache.invalidate(&key).await {
            warn!(error = %e, "Cache invalidation failed");
        }
    }

    /// The wrapped provider, for health checks and metadata
    #[must_use]
    pub fn provider(&self) -> &ChatProvider {
        &self.provider
    }
}
