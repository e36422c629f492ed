// ABOUTME: Centralized resource container for dependency injection
// ABOUTME: Constructs provider clients once at bootstrap and shares them via Arc
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # Server Resources
//!
//! Centralized resource container for dependency injection. Provider clients
//! are constructed exactly once here - at process bootstrap - and handed to
//! the components that need them. Nothing in the core lazily initializes a
//! shared client or reads one from module-level state.

use crate::auth::AuthManager;
use crate::cache::factory::Cache;
use crate::calls::CallManager;
use crate::config::environment::{ProviderMode, ServerConfig};
use crate::errors::AppResult;
use crate::events::EventBus;
use crate::executor::CallExecutor;
use crate::governor::Governor;
use crate::llm::{
    CachedChatClient, CallSummarizer, ChatProvider, OpenAiCompatibleConfig,
    OpenAiCompatibleProvider, SyntheticLlmProvider,
};
use crate::providers::speech::HttpSpeechProvider;
use crate::providers::synthetic::{SyntheticSpeechProvider, SyntheticTelephonyProvider};
use crate::providers::telephony::HttpTelephonyProvider;
use crate::providers::{SpeechProvider, TelephonyProvider};
use crate::storage::{CallStorage, InMemoryCallStorage};
use crate::transcription::TranscriptionService;
use crate::websocket::WebSocketManager;
use std::sync::Arc;

/// Shared server resources assembled at bootstrap
#[derive(Clone)]
pub struct ServerResources {
    pub config: Arc<ServerConfig>,
    pub auth_manager: Arc<AuthManager>,
    pub storage: Arc<dyn CallStorage>,
    pub governor: Arc<Governor>,
    pub executor: Arc<CallExecutor>,
    pub cache: Arc<Cache>,
    pub events: EventBus,
    pub chat: Arc<CachedChatClient>,
    pub transcription: Arc<TranscriptionService>,
    pub call_manager: Arc<CallManager>,
    pub websocket_manager: Arc<WebSocketManager>,
}

impl ServerResources {
    /// Build the full resource graph from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a provider client or the cache backend cannot be
    /// constructed.
    pub async fn from_config(config: Arc<ServerConfig>) -> anyhow::Result<Self> {
        let cache = Cache::new(config.cache.clone()).await?;

        let (telephony, speech, llm): (
            Arc<dyn TelephonyProvider>,
            Arc<dyn SpeechProvider>,
            ChatProvider,
        ) = match config.provider_mode {
            ProviderMode::Http => (
                Arc::new(HttpTelephonyProvider::new(&config.telephony)?),
                Arc::new(HttpSpeechProvider::new(&config.speech)?),
                ChatProvider::OpenAiCompatible(OpenAiCompatibleProvider::new(
                    OpenAiCompatibleConfig {
                        base_url: config.llm.base_url.clone(),
                        api_key: config.llm.api_key.clone(),
                        default_model: config.llm.model.clone(),
                        request_timeout: config.llm.request_timeout,
                    },
                )?),
            ),
            ProviderMode::Synthetic => (
                Arc::new(SyntheticTelephonyProvider::new()),
                Arc::new(SyntheticSpeechProvider::new()),
                ChatProvider::Synthetic(Arc::new(SyntheticLlmProvider::new())),
            ),
        };

        Ok(Self::builder(config)
            .with_cache(cache)
            .with_telephony(telephony)
            .with_speech(speech)
            .with_llm(llm)
            .build())
    }

    /// Create a builder for assembling resources with injected collaborators
    #[must_use]
    pub fn builder(config: Arc<ServerConfig>) -> ServerResourcesBuilder {
        ServerResourcesBuilder::new(config)
    }

    /// Verify startup health of the critical collaborators
    ///
    /// # Errors
    ///
    /// Currently never fails: the cache is best-effort and provider
    /// reachability is probed lazily. Kept as a seam for deployments that
    /// want hard startup checks.
    pub fn verify(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Builder for [`ServerResources`]; tests swap in synthetic collaborators
pub struct ServerResourcesBuilder {
    config: Arc<ServerConfig>,
    storage: Option<Arc<dyn CallStorage>>,
    cache: Option<Cache>,
    telephony: Option<Arc<dyn TelephonyProvider>>,
    speech: Option<Arc<dyn SpeechProvider>>,
    llm: Option<ChatProvider>,
}

impl ServerResourcesBuilder {
    /// Start a builder with nothing injected yet
    #[must_use]
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            config,
            storage: None,
            cache: None,
            telephony: None,
            speech: None,
            llm: None,
        }
    }

    /// Inject the storage collaborator
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn CallStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Inject the cache backend
    #[must_use]
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Inject the telephony provider
    #[must_use]
    pub fn with_telephony(mut self, telephony: Arc<dyn TelephonyProvider>) -> Self {
        self.telephony = Some(telephony);
        self
    }

    /// Inject the speech provider
    #[must_use]
    pub fn with_speech(mut self, speech: Arc<dyn SpeechProvider>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Inject the language-model provider
    #[must_use]
    pub fn with_llm(mut self, llm: ChatProvider) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Assemble the resource graph, defaulting anything not injected
    #[must_use]
    pub fn build(self) -> ServerResources {
        let config = self.config;

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryCallStorage::new()));
        let cache = Arc::new(self.cache.unwrap_or_else(|| {
            Cache::Memory(crate::cache::memory::InMemoryCache::new(
                &crate::cache::CacheConfig {
                    enable_background_cleanup: false,
                    ..config.cache.clone()
                },
            ))
        }));
        let telephony = self
            .telephony
            .unwrap_or_else(|| Arc::new(SyntheticTelephonyProvider::new()));
        let speech = self
            .speech
            .unwrap_or_else(|| Arc::new(SyntheticSpeechProvider::new()));
        let llm = Arc::new(self.llm.unwrap_or_else(|| {
            ChatProvider::Synthetic(Arc::new(SyntheticLlmProvider::new()))
        }));

        let auth_manager = Arc::new(AuthManager::new(
            config.auth.jwt_secret.as_bytes(),
            i64::try_from(config.auth.jwt_expiry_hours).unwrap_or(24),
        ));
        let governor = Arc::new(Governor::new(&config.rate_limit, &config.concurrency));
        let executor = Arc::new(CallExecutor::new(config.retry.clone()));
        let events = EventBus::new();

        let chat = Arc::new(CachedChatClient::new(
            llm,
            cache.clone(),
            executor.clone(),
            config.llm.completion_ttl,
        ));
        let summarizer = Arc::new(CallSummarizer::new(
            chat.clone(),
            storage.clone(),
            events.clone(),
        ));
        let transcription = Arc::new(TranscriptionService::new(
            speech,
            storage.clone(),
            events.clone(),
            executor.clone(),
        ));
        let call_manager = Arc::new(CallManager::new(
            storage.clone(),
            governor.clone(),
            executor.clone(),
            telephony,
            transcription.clone(),
            summarizer,
            events.clone(),
            config.base_url.clone(),
        ));
        let websocket_manager = Arc::new(WebSocketManager::new(
            auth_manager.clone(),
            call_manager.clone(),
            chat.clone(),
            governor.clone(),
            events.clone(),
            config.websocket.clone(),
        ));

        ServerResources {
            config,
            auth_manager,
            storage,
            governor,
            executor,
            cache,
            events,
            chat,
            transcription,
            call_manager,
            websocket_manager,
        }
    }
}
