// ABOUTME: Generic OpenAI-compatible LLM provider for local and cloud endpoints
// ABOUTME: Works against Ollama, vLLM, and any /chat/completions-speaking server
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Generic implementation for any `OpenAI`-compatible chat endpoint.
//!
//! Covers hosted gateways and local servers (Ollama, vLLM) alike; only the
//! base URL, model, and optional API key differ.

use super::{ChatRequest, ChatResponse, LlmCapabilities, LlmProvider, TokenUsage};
use crate::providers::errors::ProviderError;
use crate::providers::ProviderResult;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

const PROVIDER_NAME: &str = "llm";

/// Configuration for an `OpenAI`-compatible endpoint
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleConfig {
    /// API base URL, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    /// Bearer token; empty for local servers
    pub api_key: Option<String>,
    /// Model used when a request does not override one
    pub default_model: String,
    /// Per-request timeout
    pub request_timeout: std::time::Duration,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [super::ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    model: String,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Chat provider over any `OpenAI`-compatible `/chat/completions` API
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: OpenAiCompatibleConfig,
}

impl OpenAiCompatibleProvider {
    /// Build a provider from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: OpenAiCompatibleConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn display_name(&self) -> &'static str {
        "OpenAI-compatible"
    }

    fn capabilities(&self) -> LlmCapabilities {
        LlmCapabilities::STREAMING | LlmCapabilities::SYSTEM_MESSAGES
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }

    async fn complete(&self, request: &ChatRequest) -> ProviderResult<ChatResponse> {
        let model = request
            .model
            .as_deref()
            .unwrap_or(&self.config.default_model);
        debug!(model = %model, messages = request.messages.len(), "Requesting chat completion");

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut http_request = self.client.post(url).json(&WireRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        });
        if let Some(api_key) = &self.config.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ProviderError::from_request_error(PROVIDER_NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                PROVIDER_NAME,
                status.as_u16(),
                &body,
            ));
        }

        let wire: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider: PROVIDER_NAME.to_owned(),
                message: e.to_string(),
            })?;

        let content = wire
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: PROVIDER_NAME.to_owned(),
                message: "completion response contained no choices".into(),
            })?;

        Ok(ChatResponse {
            content,
            model: wire.model,
            usage: wire.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }

    async fn health_check(&self) -> ProviderResult<()> {
        let url = format!("{}/models", self.config.base_url.trim_end_matches('/'));
        let mut http_request = self.client.get(url);
        if let Some(api_key) = &self.config.api_key {
            http_request = http_request.bearer_auth(api_key);
        }

        let response = http_request
            .send()
            .await
            .map_err(|e| ProviderError::from_request_error(PROVIDER_NAME, &e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ProviderError::from_status(
                PROVIDER_NAME,
                status.as_u16(),
                "",
            ))
        }
    }
}
