//! Security Middleware Module
//!
//! Provides Axum middleware for API key authentication, CORS and security headers.

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tracing::{debug, warn};

use crate::config::config::SecurityConfig;
use crate::error::AppError;
use crate::security::auth::{API_KEY_HEADER, ApiKeyAuth, Credentials};

/// Authentication middleware
pub async fn api_key_middleware(
    State(auth): State<Arc<ApiKeyAuth>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Preflight requests never carry credentials
    if req.method() == Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let credentials = Credentials::from_headers(req.headers());
    if let Err(e) = auth.authenticate(&credentials) {
        debug!("Rejected {} {}: {}", req.method(), req.uri().path(), e);
        return Err(e);
    }

    Ok(next.run(req).await)
}

/// Security headers middleware
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );

    response
}

/// Build the CORS layer
///
/// `*` allows any origin without credentials. An explicit origin list allows
/// credentials, so methods and headers mirror the preflight request instead
/// of using wildcards.
pub fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    let expose = [HeaderName::from_static(API_KEY_HEADER)];

    match config.cors_origins() {
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(expose),
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin: {}", o);
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_credentials(true)
                .allow_methods(AllowMethods::mirror_request())
                .allow_headers(AllowHeaders::mirror_request())
                .expose_headers(expose)
        }
    }
}
