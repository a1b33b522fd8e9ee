use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode, header};
use axum::response::IntoResponse;
use edutrack_core::error::{ApiError, codes};
use tower_governor::{
    GovernorError, GovernorLayer, governor::GovernorConfigBuilder,
    key_extractor::SmartIpKeyExtractor,
};

type RateLimitLayer =
    GovernorLayer<SmartIpKeyExtractor, governor::middleware::NoOpMiddleware, Body>;

/// Per-IP limiter replenishing one request every `period`, allowing `burst`.
fn per_ip(period: Duration, burst: u32, name: &str) -> RateLimitLayer {
    let config = GovernorConfigBuilder::default()
        .period(period)
        .burst_size(burst)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .unwrap_or_else(|| panic!("invalid governor config for {name}"));
    GovernorLayer::new(config).error_handler(json_error_handler)
}

/// Register, login and password reset: 10 requests per minute per IP.
pub fn auth_layer() -> RateLimitLayer {
    per_ip(Duration::from_secs(6), 10, "auth")
}

/// Token refresh and logout: 30 requests per minute per IP.
pub fn token_layer() -> RateLimitLayer {
    per_ip(Duration::from_secs(2), 30, "token")
}

/// Chat messages: 20 per minute per IP. Every message may cost an upstream
/// model call.
pub fn chat_layer() -> RateLimitLayer {
    per_ip(Duration::from_secs(3), 10, "chat")
}

/// Everything else: 120 requests per minute per IP.
pub fn default_layer() -> RateLimitLayer {
    per_ip(Duration::from_millis(500), 30, "default")
}

/// `ApiError` body with `Retry-After` when the wait is known.
fn json_error_handler(err: GovernorError) -> Response<Body> {
    let (status, retry_after, message) = match err {
        GovernorError::TooManyRequests { wait_time, .. } => (
            StatusCode::TOO_MANY_REQUESTS,
            Some(wait_time),
            format!("Too many requests. Retry after {wait_time} seconds."),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
            "Unable to determine client identity for rate limiting".to_string(),
        ),
        GovernorError::Other { code, msg, .. } => (code, None, msg.unwrap_or_default()),
    };

    let body = ApiError {
        error: codes::RATE_LIMITED.to_string(),
        message,
        field: None,
        received: None,
        request_id: uuid::Uuid::now_v7().to_string(),
        docs_hint: None,
    };

    let mut response = (status, Json(body)).into_response();
    if let Some(wait) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(wait));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_requests_carries_retry_after() {
        let response = json_error_handler(GovernorError::TooManyRequests {
            wait_time: 7,
            headers: None,
        });
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }

    #[test]
    fn layers_build_from_their_configs() {
        let _ = auth_layer();
        let _ = token_layer();
        let _ = chat_layer();
        let _ = default_layer();
    }
}
