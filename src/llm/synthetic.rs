// ABOUTME: In-process deterministic LLM provider for tests and local development
// ABOUTME: Counts completions so cache-hit behavior can be asserted
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

use super::{ChatRequest, ChatResponse, LlmCapabilities, LlmProvider};
use crate::providers::errors::ProviderError;
use crate::providers::ProviderResult;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Deterministic chat provider with scriptable failures
///
/// Responses are a function of the request alone, so repeated identical
/// requests produce identical content - which is what the cache layer
/// depends on. [`SyntheticLlmProvider::completion_count`] exposes how many
/// completions actually reached the provider, letting tests distinguish
/// cache hits from provider calls.
#[derive(Debug, Default)]
pub struct SyntheticLlmProvider {
    completions: AtomicU32,
    scripted_failures: Mutex<VecDeque<ProviderError>>,
}

impl SyntheticLlmProvider {
    /// Create a provider that answers every request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error to be returned by the next `complete`
    pub fn fail_next(&self, error: ProviderError) {
        self.scripted_failures.lock().unwrap().push_back(error);
    }

    /// Number of completions that reached the provider (cache misses)
    #[must_use]
    pub fn completion_count(&self) -> u32 {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for SyntheticLlmProvider {
    fn name(&self) -> &'static str {
        "synthetic-llm"
    }

    fn display_name(&self) -> &'static str {
        "Synthetic LLM"
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::SYSTEM_MESSAGES
    }

    fn default_model(&self) -> &str {
        "synthetic-1"
    }

    async fn complete(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        if let Some(error) = self.scripted_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.completions.fetch_add(1, Ordering::SeqCst);

        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, super::MessageRole::User))
            .map_or("", |m| m.content.as_str());
        let excerpt: String = last_user.chars().take(48).collect();

        Ok(ChatResponse {
            content: format!(
                "[synthetic completion of {} messages] {excerpt}",
                request.messages.len()
            ),
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model().to_owned()),
            usage: None,
        })
    }

    async fn health_check(&self) -> ProviderResult<()> {
        Ok(())
    }
}
