// ABOUTME: Structured error types for external provider operations
// ABOUTME: Classifies failures as transient (retryable) or fatal with retry metadata
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Provider error taxonomy.
//!
//! Transient errors (rate limiting, 5xx, connection resets, timeouts) are
//! worth retrying; everything else is surfaced immediately as fatal. The
//! [`crate::executor`] consults [`ProviderError::is_retryable`] through its
//! policy classifier before each retry decision.

use crate::errors::{AppError, ErrorCode};
use thiserror::Error;

/// Errors from outbound telephony, speech, and language-model calls
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Provider rejected the request due to rate limiting
    #[error("{provider} rate limited the request")]
    RateLimited {
        provider: String,
        /// Provider-suggested wait, when the response carried one
        retry_after_secs: Option<u64>,
    },

    /// Provider returned a server-side (5xx) error
    #[error("{provider} server error (status {status})")]
    ServerError { provider: String, status: u16 },

    /// Connection could not be established or was reset
    #[error("{provider} connection failed: {message}")]
    ConnectionFailed { provider: String, message: String },

    /// Request exceeded its deadline
    #[error("{provider} request timed out")]
    Timeout { provider: String },

    /// Credentials were rejected by the provider
    #[error("{provider} authentication failed: {message}")]
    AuthFailed { provider: String, message: String },

    /// Provider rejected the request as malformed (e.g. invalid number)
    #[error("{provider} rejected the request: {message}")]
    InvalidRequest { provider: String, message: String },

    /// Referenced remote resource does not exist
    #[error("{provider} has no such resource: {resource}")]
    NotFound { provider: String, resource: String },

    /// Response body could not be parsed
    #[error("{provider} returned an unparseable response: {message}")]
    InvalidResponse { provider: String, message: String },

    /// All retry attempts were exhausted; wraps the last error observed
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryBudgetExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Whether this error is a transient condition worth retrying
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::ConnectionFailed { .. }
                | Self::Timeout { .. }
        )
    }

    /// The provider (or operation) this error originated from
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::RateLimited { provider, .. }
            | Self::ServerError { provider, .. }
            | Self::ConnectionFailed { provider, .. }
            | Self::Timeout { provider }
            | Self::AuthFailed { provider, .. }
            | Self::InvalidRequest { provider, .. }
            | Self::NotFound { provider, .. }
            | Self::InvalidResponse { provider, .. } => provider,
            Self::RetryBudgetExhausted { operation, .. } => operation,
        }
    }

    /// Classify a transport-level `reqwest` failure
    pub fn from_request_error(provider: &str, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                provider: provider.to_owned(),
            }
        } else if error.is_connect() {
            Self::ConnectionFailed {
                provider: provider.to_owned(),
                message: error.to_string(),
            }
        } else {
            Self::InvalidResponse {
                provider: provider.to_owned(),
                message: error.to_string(),
            }
        }
    }

    /// Classify a non-success HTTP status from a provider API
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        match status {
            429 => Self::RateLimited {
                provider: provider.to_owned(),
                retry_after_secs: None,
            },
            500..=599 => Self::ServerError {
                provider: provider.to_owned(),
                status,
            },
            401 | 403 => Self::AuthFailed {
                provider: provider.to_owned(),
                message: body.to_owned(),
            },
            404 => Self::NotFound {
                provider: provider.to_owned(),
                resource: body.to_owned(),
            },
            _ => Self::InvalidRequest {
                provider: provider.to_owned(),
                message: format!("status {status}: {body}"),
            },
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(error: ProviderError) -> Self {
        let code = match &error {
            ProviderError::RateLimited { .. } => ErrorCode::ProviderRateLimited,
            ProviderError::ServerError { .. }
            | ProviderError::ConnectionFailed { .. }
            | ProviderError::Timeout { .. } => ErrorCode::ProviderUnavailable,
            ProviderError::AuthFailed { .. } => ErrorCode::ProviderAuthFailed,
            ProviderError::InvalidRequest { .. } => ErrorCode::InvalidInput,
            ProviderError::NotFound { .. } => ErrorCode::ResourceNotFound,
            ProviderError::InvalidResponse { .. } => ErrorCode::ProviderError,
            ProviderError::RetryBudgetExhausted { source, .. } => match source.as_ref() {
                ProviderError::RateLimited { .. } => ErrorCode::ProviderRateLimited,
                _ => ErrorCode::ProviderUnavailable,
            },
        };
        let message = error.to_string();
        Self::new(code, message).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transient = [
            ProviderError::RateLimited {
                provider: "telephony".into(),
                retry_after_secs: Some(5),
            },
            ProviderError::ServerError {
                provider: "telephony".into(),
                status: 503,
            },
            ProviderError::ConnectionFailed {
                provider: "speech".into(),
                message: "reset by peer".into(),
            },
            ProviderError::Timeout {
                provider: "llm".into(),
            },
        ];
        for error in transient {
            assert!(error.is_retryable(), "{error} should be retryable");
        }

        let fatal = [
            ProviderError::AuthFailed {
                provider: "telephony".into(),
                message: "bad key".into(),
            },
            ProviderError::InvalidRequest {
                provider: "telephony".into(),
                message: "invalid number".into(),
            },
            ProviderError::NotFound {
                provider: "telephony".into(),
                resource: "call".into(),
            },
        ];
        for error in fatal {
            assert!(!error.is_retryable(), "{error} should be fatal");
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(ProviderError::from_status("t", 429, "").is_retryable());
        assert!(ProviderError::from_status("t", 502, "").is_retryable());
        assert!(!ProviderError::from_status("t", 400, "bad number").is_retryable());
        assert!(!ProviderError::from_status("t", 401, "").is_retryable());
    }

    #[test]
    fn test_app_error_mapping() {
        let error: AppError = ProviderError::InvalidRequest {
            provider: "telephony".into(),
            message: "invalid destination".into(),
        }
        .into();
        assert_eq!(error.code, ErrorCode::InvalidInput);

        let error: AppError = ProviderError::RetryBudgetExhausted {
            operation: "telephony.place_call".into(),
            attempts: 3,
            source: Box::new(ProviderError::Timeout {
                provider: "telephony".into(),
            }),
        }
        .into();
        assert_eq!(error.code, ErrorCode::ProviderUnavailable);
    }
}
