// ABOUTME: LLM provider abstraction for summarization and agent responses
// ABOUTME: Defines the chat contract implemented by HTTP and synthetic providers
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # LLM Provider Interface
//!
//! Language-model access for post-call summarization and agent responses.
//! Providers implement [`LlmProvider`]; the concrete client is selected at
//! bootstrap and always invoked through the resilient executor and the
//! response cache ([`cached::CachedChatClient`]), never directly from
//! handlers.

pub mod cached;
pub mod openai_compatible;
pub mod summarizer;
pub mod synthetic;

pub use cached::CachedChatClient;
pub use openai_compatible::{OpenAiCompatibleConfig, OpenAiCompatibleProvider};
pub use summarizer::CallSummarizer;
pub use synthetic::SyntheticLlmProvider;

use crate::providers::ProviderResult;
use async_trait::async_trait;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Feature flags describing what a provider supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LlmCapabilities: u32 {
        /// Incremental token streaming
        const STREAMING = 1 << 0;
        /// Dedicated system-role messages
        const SYSTEM_MESSAGES = 1 << 1;
        /// Tool/function calling
        const FUNCTION_CALLING = 1 << 2;
    }
}

/// Role of one chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message in a chat conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Conversation so far
    pub messages: Vec<ChatMessage>,
    /// Model override; the provider default is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Response length cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Create a request with default sampling parameters
    #[must_use]
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Override the model for this request
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the sampling temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Canonical payload used to fingerprint this request for caching
    ///
    /// The resolved model is included so a model override never reuses
    /// another model's cached response.
    #[must_use]
    pub fn normalized_payload(&self, resolved_model: &str) -> serde_json::Value {
        serde_json::json!({
            "model": resolved_model,
            "messages": self.messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Assistant message content
    pub content: String,
    /// Model that produced the response
    pub model: String,
    /// Token usage, when the provider reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Contract implemented by every language-model provider
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logging
    fn name(&self) -> &'static str;

    /// Human-readable provider name
    fn display_name(&self) -> &'static str;

    /// Capability flags
    fn capabilities(&self) -> LlmCapabilities;

    /// Model used when the request does not override one
    fn default_model(&self) -> &str;

    /// Perform a chat completion
    ///
    /// # Errors
    ///
    /// Returns a [`crate::providers::ProviderError`] classified for the
    /// resilient executor.
    async fn complete(&self, request: &ChatRequest) -> ProviderResult<ChatResponse>;

    /// Check provider reachability
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be reached.
    async fn health_check(&self) -> ProviderResult<()>;
}

/// Unified chat provider over the configured backend
pub enum ChatProvider {
    /// Any OpenAI-compatible endpoint (cloud or local)
    OpenAiCompatible(OpenAiCompatibleProvider),
    /// In-process deterministic provider for tests and local development
    ///
    /// Arc-shared so tests can keep a handle for completion-count asserts.
    Synthetic(std::sync::Arc<SyntheticLlmProvider>),
}

#[async_trait]
impl LlmProvider for ChatProvider {
    fn name(&self) -> &'static str {
        match self {
            Self::OpenAiCompatible(p) => p.name(),
            Self::Synthetic(p) => p.name(),
        }
    }

    fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAiCompatible(p) => p.display_name(),
            Self::Synthetic(p) => p.display_name(),
        }
    }

    fn capabilities(&self) -> LlmCapabilities {
        match self {
            Self::OpenAiCompatible(p) => p.capabilities(),
            Self::Synthetic(p) => p.capabilities(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            Self::OpenAiCompatible(p) => p.default_model(),
            Self::Synthetic(p) => p.default_model(),
        }
    }

    async fn complete(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        match self {
            Self::OpenAiCompatible(p) => p.complete(request).await,
            Self::Synthetic(p) => p.complete(request).await,
        }
    }

    async fn health_check(&self) -> ProviderResult<()> {
        match self {
            Self::OpenAiCompatible(p) => p.health_check().await,
            Self::Synthetic(p) => p.health_check().await,
        }
    }
}

impl std::fmt::Debug for ChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAiCompatible(_) => f.debug_tuple("ChatProvider::OpenAiCompatible").finish(),
            Self::Synthetic(_) => f.debug_tuple("ChatProvider::Synthetic").finish(),
        }
    }
}
