use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};

use crate::error::AppError;
use crate::models::rate_limit::{RateLimitCategory, RateLimitDecision};
use crate::state::AppState;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const RESET_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const UNKNOWN_ORIGIN: &str = "unknown";

/// Origin identity the limiter counted this request under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOrigin(pub String);

pub async fn rate_limit_registration(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, RateLimitCategory::Registration, request, next).await
}

pub async fn rate_limit_api(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, RateLimitCategory::Api, request, next).await
}

pub async fn rate_limit_scan(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    enforce(&state, RateLimitCategory::Scan, request, next).await
}

async fn enforce(
    state: &AppState,
    category: RateLimitCategory,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let origin = client_origin(&request, state.config.trust_forwarded_for);
    let decision = state
        .rate_limiter
        .check(category, &origin)
        .await
        .map_err(|err| {
            AppError::ServiceUnavailable(format!("rate limiter ({}): {}", category, err))
        })?;

    if !decision.allowed {
        let retry_after = decision.retry_after.unwrap_or(1);
        tracing::debug!(
            category = %category,
            origin = %origin,
            retry_after,
            "Rate limit exceeded"
        );
        let mut response = AppError::TooManyRequests { retry_after }.into_response();
        apply_headers(response.headers_mut(), &decision);
        return Ok(response);
    }

    request.extensions_mut().insert(ClientOrigin(origin));
    let mut response = next.run(request).await;
    apply_headers(response.headers_mut(), &decision);
    Ok(response)
}

fn apply_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(decision.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(decision.reset_at.timestamp()));
}

/// Origin identity for rate limiting: the first `X-Forwarded-For` hop when
/// the deployment sits behind a trusted proxy, the peer address otherwise.
pub fn client_origin(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get(FORWARDED_FOR_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|hop| hop.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RateLimitPolicy};
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(config: Config) -> Router {
        let state = AppState::in_memory(config);
        Router::new()
            .route("/limited", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                rate_limit_registration,
            ))
            .with_state(state)
    }

    fn request_from(peer: &str, forwarded_for: Option<&str>) -> Request {
        let mut request = axum::http::Request::builder()
            .uri("/limited")
            .body(Body::empty())
            .expect("build request");
        let addr: SocketAddr = peer.parse().expect("socket addr");
        request.extensions_mut().insert(ConnectInfo(addr));
        if let Some(value) = forwarded_for {
            request.headers_mut().insert(
                FORWARDED_FOR_HEADER,
                HeaderValue::from_str(value).expect("header"),
            );
        }
        request
    }

    fn tight_config(trust_forwarded_for: bool) -> Config {
        Config {
            rate_limit_registration: RateLimitPolicy::new(2, 3600, 3600),
            trust_forwarded_for,
            ..Config::default()
        }
    }

    #[test]
    fn origin_prefers_peer_unless_proxy_trusted() {
        let request = request_from("10.1.1.1:5000", Some("203.0.113.5, 10.0.0.1"));
        assert_eq!(client_origin(&request, false), "10.1.1.1");
        assert_eq!(client_origin(&request, true), "203.0.113.5");

        let garbage = request_from("10.1.1.1:5000", Some("not-an-ip"));
        assert_eq!(client_origin(&garbage, true), "10.1.1.1");
    }

    #[test]
    fn origin_without_connect_info_is_unknown() {
        let request = axum::http::Request::builder()
            .uri("/")
            .body(Body::empty())
            .expect("build request");
        assert_eq!(client_origin(&request, false), UNKNOWN_ORIGIN);
    }

    #[tokio::test]
    async fn allowed_responses_carry_limit_headers() {
        let app = app(tight_config(false));
        let response = app
            .oneshot(request_from("192.0.2.1:4000", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "1");
        assert!(response.headers().contains_key("x-ratelimit-reset"));
    }

    #[tokio::test]
    async fn third_request_is_rejected_with_retry_after() {
        let app = app(tight_config(false));
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(request_from("192.0.2.2:4000", None))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app
            .clone()
            .oneshot(request_from("192.0.2.2:4001", None))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "3600");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");

        let body = response.into_body().collect().await.expect("body").to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["code"], "RATE_LIMITED");

        let other_peer = app
            .oneshot(request_from("192.0.2.3:4000", None))
            .await
            .expect("response");
        assert_eq!(other_peer.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forwarded_origins_are_counted_separately_when_trusted() {
        let app = app(tight_config(true));
        for client in ["198.51.100.1", "198.51.100.2", "198.51.100.3"] {
            let response = app
                .clone()
                .oneshot(request_from("10.0.0.1:443", Some(client)))
                .await
                .expect("response");
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
