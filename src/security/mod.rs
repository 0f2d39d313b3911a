//! Security Module
//!
//! Provides the security features of the Scan Invoice API:
//! - API key authentication (`X-API-Key` / `Authorization: ApiKey`)
//! - CORS policy built from configuration
//! - Security headers

pub mod auth;
pub mod middleware;

pub use auth::{ApiKeyAuth, Credentials};
pub use middleware::{api_key_middleware, cors_layer, security_headers_middleware};
