// ABOUTME: JWT-based authentication for REST requests and the WebSocket handshake
// ABOUTME: Validates HS256 bearer tokens carrying user and tenant identity
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # Authentication
//!
//! Token issuance lives outside this core; this module only validates
//! presented credentials and extracts the caller's identity. The same
//! [`AuthManager`] backs the REST bearer middleware and the WebSocket
//! handshake.

use crate::errors::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `JWT` claims carried by Switchboard access tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    /// Tenant id
    pub tenant: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration (unix seconds)
    pub exp: i64,
}

/// Verified identity extracted from a valid token
#[derive(Debug, Clone, Copy)]
pub struct AuthResult {
    /// Authenticated user
    pub user_id: Uuid,
    /// Tenant the user belongs to
    pub tenant_id: Uuid,
}

/// Validates access tokens for the REST and signaling surfaces
#[derive(Clone)]
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

impl AuthManager {
    /// Create a manager validating HS256 tokens signed with `secret`
    #[must_use]
    pub fn new(secret: &[u8], expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            expiry_hours,
        }
    }

    /// Issue a token for local development and tests
    ///
    /// Production tokens are issued by the identity service; this exists so
    /// the core is exercisable without it.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn generate_token(&self, user_id: Uuid, tenant_id: Uuid) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            tenant: tenant_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.expiry_hours)).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("failed to sign token: {e}")))
    }

    /// Validate a bearer token and extract the caller's identity
    ///
    /// Accepts the raw token with or without a `Bearer ` prefix.
    ///
    /// # Errors
    ///
    /// Returns `AuthInvalid` for malformed/forged tokens and expired tokens.
    pub fn validate_token(&self, token: &str) -> AppResult<AuthResult> {
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(AppError::auth_required());
        }

        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::auth_invalid(format!("token rejected: {e}")))?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::auth_invalid("token subject is not a valid user id"))?;
        let tenant_id = Uuid::parse_str(&data.claims.tenant)
            .map_err(|_| AppError::auth_invalid("token tenant is not a valid tenant id"))?;

        Ok(AuthResult { user_id, tenant_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    fn manager() -> AuthManager {
        AuthManager::new(b"test-secret", 1)
    }

    #[test]
    fn test_round_trip() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();

        let token = manager.generate_token(user_id, tenant_id).unwrap();
        let auth = manager.validate_token(&token).unwrap();
        assert_eq!(auth.user_id, user_id);
        assert_eq!(auth.tenant_id, tenant_id);

        // Bearer prefix is accepted too
        let auth = manager.validate_token(&format!("Bearer {token}")).unwrap();
        assert_eq!(auth.user_id, user_id);
    }

    #[test]
    fn test_forged_token_rejected() {
        let manager = manager();
        let other = AuthManager::new(b"other-secret", 1);
        let token = other
            .generate_token(Uuid::new_v4(), Uuid::new_v4())
            .unwrap();

        let error = manager.validate_token(&token).unwrap_err();
        assert_eq!(error.code, ErrorCode::AuthInvalid);
    }

    #[test]
    fn test_empty_token_requires_auth() {
        let error = manager().validate_token("").unwrap_err();
        assert_eq!(error.code, ErrorCode::AuthRequired);
    }
}
