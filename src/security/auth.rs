//! Authentication Module
//!
//! API keys come from `API_KEYS` (comma separated) and `SCAN_API_KEY`.
//! With no keys configured authentication is disabled.

use axum::http::{HeaderMap, header};
use std::collections::HashSet;

use crate::config::config::SecurityConfig;
use crate::error::{AppError, Result};

/// Header carrying the API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Message returned for every rejected request
pub const INVALID_KEY_MESSAGE: &str = "Invalid or missing API key";

/// Credentials for authentication
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// API key (if provided)
    pub api_key: Option<String>,
}

impl Credentials {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    /// `X-API-Key` wins over `Authorization: ApiKey <key>`
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let from_header = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|k| !k.is_empty());
        if let Some(key) = from_header {
            return Self::new(Some(key.to_string()));
        }

        let from_authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("ApiKey "))
            .map(str::trim)
            .filter(|k| !k.is_empty());
        Self::new(from_authorization.map(str::to_string))
    }
}

/// API Key based authentication
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuth {
    valid_keys: HashSet<String>,
}

impl ApiKeyAuth {
    /// Create new API key authenticator
    pub fn new(api_keys: HashSet<String>) -> Self {
        Self {
            valid_keys: api_keys,
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Self {
        Self::new(config.api_key_set())
    }

    /// Whether any key is configured
    pub fn is_enabled(&self) -> bool {
        !self.valid_keys.is_empty()
    }

    pub fn key_count(&self) -> usize {
        self.valid_keys.len()
    }

    /// Check credentials; always succeeds when authentication is disabled
    pub fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        match credentials.api_key.as_deref() {
            Some(key) if self.valid_keys.contains(key) => Ok(()),
            _ => Err(AppError::Authorization(INVALID_KEY_MESSAGE.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn auth() -> ApiKeyAuth {
        ApiKeyAuth::new(["alpha".to_string(), "beta".to_string()].into_iter().collect())
    }

    #[test]
    fn test_credentials_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(Credentials::from_headers(&headers).api_key.is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("ApiKey beta"));
        assert_eq!(
            Credentials::from_headers(&headers).api_key.as_deref(),
            Some("beta")
        );

        headers.insert(API_KEY_HEADER, HeaderValue::from_static(" alpha "));
        assert_eq!(
            Credentials::from_headers(&headers).api_key.as_deref(),
            Some("alpha")
        );
    }

    #[test]
    fn test_bearer_is_not_an_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer alpha"));
        assert!(Credentials::from_headers(&headers).api_key.is_none());
    }

    #[test]
    fn test_authenticate() {
        let auth = auth();
        assert!(auth.is_enabled());
        assert!(auth.authenticate(&Credentials::new(Some("alpha".into()))).is_ok());

        let err = auth
            .authenticate(&Credentials::new(Some("gamma".into())))
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(ref m) if m == INVALID_KEY_MESSAGE));
        assert!(auth.authenticate(&Credentials::default()).is_err());
    }

    #[test]
    fn test_disabled_without_keys() {
        let auth = ApiKeyAuth::from_config(&SecurityConfig::default());
        assert!(!auth.is_enabled());
        assert!(auth.authenticate(&Credentials::default()).is_ok());
    }
}
