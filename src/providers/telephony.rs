// ABOUTME: HTTP telephony provider client for placing and terminating calls
// ABOUTME: Maps transport failures and response statuses into the provider error taxonomy
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! HTTP client for the telephony provider's call-control API.
//!
//! The provider accepts a call request and reports progress asynchronously to
//! the webhook callback URL; only placement and termination happen over this
//! client. Every request carries an explicit timeout so a hung provider
//! surfaces as a transient [`ProviderError::Timeout`].

use super::errors::ProviderError;
use super::{ProviderResult, TelephonyProvider};
use crate::config::environment::TelephonyConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const PROVIDER_NAME: &str = "telephony";

#[derive(Debug, Serialize)]
struct PlaceCallRequest<'a> {
    from: &'a str,
    to: &'a str,
    status_callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct PlaceCallResponse {
    call_ref: String,
}

/// Telephony provider client over its REST call-control API
#[derive(Debug, Clone)]
pub struct HttpTelephonyProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpTelephonyProvider {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &TelephonyConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }

    async fn check_status(response: reqwest::Response) -> ProviderResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::from_status(
            PROVIDER_NAME,
            status.as_u16(),
            &body,
        ))
    }
}

#[async_trait]
impl TelephonyProvider for HttpTelephonyProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn place_call(&self, from: &str, to: &str, callback_url: &str) -> ProviderResult<String> {
        debug!(from = %from, to = %to, "Placing outbound call");

        let response = self
            .client
            .post(format!("{}/v1/calls", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&PlaceCallRequest {
                from,
                to,
                status_callback_url: callback_url,
            })
            .send()
            .await
            .map_err(|e| ProviderError::from_request_error(PROVIDER_NAME, &e))?;

        let response = Self::check_status(response).await?;
        let placed: PlaceCallResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: PROVIDER_NAME.to_owned(),
                    message: e.to_string(),
                })?;

        info!(call_ref = %placed.call_ref, "Provider accepted outbound call");
        Ok(placed.call_ref)
    }

    async fn terminate_call(&self, provider_ref: &str) -> ProviderResult<()> {
        debug!(call_ref = %provider_ref, "Terminating call on provider");

        let response = self
            .client
            .post(format!("{}/v1/calls/{provider_ref}/terminate", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::from_request_error(PROVIDER_NAME, &e))?;

        Self::check_status(response).await?;
        info!(call_ref = %provider_ref, "Provider confirmed call termination");
        Ok(())
    }
}
