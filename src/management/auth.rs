//! Management API Authentication

use super::types::ApiAuthConfig;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// API key check for protected routes
pub struct ApiAuth {
    config: ApiAuthConfig,
}

impl ApiAuth {
    pub fn new(config: ApiAuthConfig) -> Self {
        Self { config }
    }

    fn validate_api_key(&self, headers: &HeaderMap) -> bool {
        let Some(expected_key) = &self.config.api_key else {
            return false;
        };
        headers
            .get("x-api-key")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|provided_key| provided_key == expected_key)
    }

    /// Authenticate request
    pub fn authenticate(&self, headers: &HeaderMap) -> bool {
        if !self.config.enabled {
            debug!("API authentication disabled, allowing request");
            return true;
        }

        if self.validate_api_key(headers) {
            debug!("API key authentication successful");
            return true;
        }

        warn!("API authentication failed");
        false
    }
}

/// Authentication middleware function
pub async fn auth_middleware(
    State(auth): State<Arc<ApiAuth>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.authenticate(request.headers()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_api_key_auth() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: true,
            api_key: Some("test-key".to_string()),
        });
        let mut headers = HeaderMap::new();

        assert!(!auth.authenticate(&headers));

        headers.insert("x-api-key", HeaderValue::from_static("test-key"));
        assert!(auth.authenticate(&headers));

        headers.insert("x-api-key", HeaderValue::from_static("wrong-key"));
        assert!(!auth.authenticate(&headers));
    }

    #[test]
    fn test_missing_key_rejects_everything() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: true,
            api_key: None,
        });
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("anything"));
        assert!(!auth.authenticate(&headers));
    }

    #[test]
    fn test_disabled_auth() {
        let auth = ApiAuth::new(ApiAuthConfig {
            enabled: false,
            api_key: Some("test-key".to_string()),
        });
        assert!(auth.authenticate(&HeaderMap::new()));
    }
}
