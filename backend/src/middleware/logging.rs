use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header::CONTENT_LENGTH, Request, StatusCode},
    middleware::Next,
    response::Response,
    Error as AxumError,
};
use std::time::Instant;

use crate::middleware::request_id::RequestId;

const MAX_BUFFERED_BODY_BYTES: usize = 64 * 1024;
const MAX_LOGGED_BODY_BYTES: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Debug,
    Warn,
    Error,
}

/// Rate-limit rejections are routine traffic shaping, so they stay at debug.
fn severity_for(status: StatusCode) -> Severity {
    if status.is_server_error() {
        Severity::Error
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Severity::Debug
    } else {
        Severity::Warn
    }
}

/// Logs every 4xx/5xx response with a truncated body preview. The body is
/// buffered and forwarded unchanged.
pub async fn log_error_responses(req: Request<Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let uri = req.uri().path().to_string();
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status();

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let event = ErrorEvent {
        status,
        method: &method,
        path: &uri,
        request_id: &request_id,
        latency_ms: start.elapsed().as_millis() as u64,
    };
    let (mut parts, body) = response.into_parts();
    match buffer_body(body).await {
        Ok((bytes, preview)) => {
            event.log(&preview, None);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(err) => {
            parts.headers.remove(CONTENT_LENGTH);
            event.log("", Some(err));
            Response::from_parts(parts, Body::empty())
        }
    }
}

async fn buffer_body(body: Body) -> Result<(Bytes, String), AxumError> {
    let bytes = to_bytes(body, MAX_BUFFERED_BODY_BYTES).await?;
    let preview = if bytes.len() > MAX_LOGGED_BODY_BYTES {
        let slice = bytes.slice(0..MAX_LOGGED_BODY_BYTES);
        format!(
            "{}... (truncated, {} bytes total)",
            String::from_utf8_lossy(&slice),
            bytes.len()
        )
    } else {
        String::from_utf8_lossy(&bytes).to_string()
    };
    Ok((bytes, preview))
}

struct ErrorEvent<'a> {
    status: StatusCode,
    method: &'a str,
    path: &'a str,
    request_id: &'a str,
    latency_ms: u64,
}

impl ErrorEvent<'_> {
    fn log(&self, body_preview: &str, body_error: Option<AxumError>) {
        let status = self.status.as_u16();
        let (method, path, request_id, latency_ms) =
            (self.method, self.path, self.request_id, self.latency_ms);
        let error = body_error.map(|err| err.to_string()).unwrap_or_default();

        match severity_for(self.status) {
            Severity::Error => tracing::error!(
                status,
                method,
                path,
                request_id,
                latency_ms,
                body = body_preview,
                body_error = %error,
                "Request completed with error status"
            ),
            Severity::Warn => tracing::warn!(
                status,
                method,
                path,
                request_id,
                latency_ms,
                body = body_preview,
                body_error = %error,
                "Request completed with error status"
            ),
            Severity::Debug => tracing::debug!(
                status,
                method,
                path,
                request_id,
                latency_ms,
                "Request rejected by rate limiter"
            ),
        }
    }
}
