use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";
const CORRELATION_ID_HEADER: &str = "x-correlation-id";
const MAX_REQUEST_ID_LEN: usize = 128;

#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Caller-supplied ids are kept only when short and printable, since they end
/// up in logs and the scan activity table.
fn accept_request_id(value: &str) -> Option<String> {
    let value = value.trim();
    let printable = value.chars().all(|c| c.is_ascii_graphic());
    (!value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN && printable)
        .then(|| value.to_string())
}

pub async fn request_id(mut req: Request, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    let id = req
        .headers()
        .get(&header_name)
        .or_else(|| {
            req.headers()
                .get(HeaderName::from_static(CORRELATION_ID_HEADER))
        })
        .and_then(|v| v.to_str().ok())
        .and_then(accept_request_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut response = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(header_name, value);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_short_printable_ids() {
        assert_eq!(accept_request_id(" abc-123 "), Some("abc-123".to_string()));
    }

    #[test]
    fn rejects_blank_long_or_spaced_ids() {
        assert_eq!(accept_request_id(""), None);
        assert_eq!(accept_request_id("a b"), None);
        assert_eq!(accept_request_id(&"x".repeat(129)), None);
    }
}
