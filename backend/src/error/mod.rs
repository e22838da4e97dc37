use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::repositories::StorageError;

/// Body of every non-scan error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    BadRequest(String),
    InternalServerError(anyhow::Error),
    Validation(Vec<String>),
    /// Rejected by the rate limiter; carries the `Retry-After` seconds.
    TooManyRequests { retry_after: u64 },
    /// Infrastructure failure. The detail is logged, never returned.
    ServiceUnavailable(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            AppError::TooManyRequests { .. } => "RATE_LIMITED",
            AppError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code().to_string();
        let mut retry_after_header = None;

        let (error, details) = match self {
            AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg) => (msg, None),
            AppError::Validation(errors) => (
                "Validation failed".to_string(),
                Some(json!({ "errors": errors })),
            ),
            AppError::TooManyRequests { retry_after } => {
                retry_after_header = Some(retry_after);
                (
                    "Too many requests".to_string(),
                    Some(json!({ "retry_after": retry_after })),
                )
            }
            AppError::InternalServerError(err) => {
                tracing::error!("Internal server error: {:?}", err);
                ("Internal server error".to_string(), None)
            }
            AppError::ServiceUnavailable(detail) => {
                tracing::error!(detail = %detail, "Service unavailable");
                (
                    "Service temporarily unavailable, please try again".to_string(),
                    None,
                )
            }
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error,
                code,
                details,
            }),
        )
            .into_response();
        if let Some(seconds) = retry_after_header {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err)
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(msg) => AppError::Conflict(msg),
            other => AppError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn response_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let cases = [
            (AppError::BadRequest("bad".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Unauthorized("nope".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("denied".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::Conflict("taken".into()), StatusCode::CONFLICT, "CONFLICT"),
            (AppError::NotFound("missing".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
        ];
        for (err, status, code) in cases {
            let expected = match &err {
                AppError::BadRequest(m)
                | AppError::Unauthorized(m)
                | AppError::Forbidden(m)
                | AppError::Conflict(m)
                | AppError::NotFound(m) => m.clone(),
                _ => unreachable!(),
            };
            let response = err.into_response();
            assert_eq!(response.status(), status);
            let json = response_json(response).await;
            assert_eq!(json["error"], expected);
            assert_eq!(json["code"], code);
            assert!(json.get("details").is_none());
        }
    }

    #[tokio::test]
    async fn validation_lists_every_message() {
        let response = AppError::Validation(vec!["year: range".to_string()]).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = response_json(response).await;
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["details"]["errors"][0], "year: range");
    }

    #[tokio::test]
    async fn internal_errors_use_generic_message() {
        let response = AppError::InternalServerError(anyhow::anyhow!("pool exploded")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = response_json(response).await;
        assert_eq!(json["error"], "Internal server error");
        assert!(json["details"].is_null());
    }

    #[tokio::test]
    async fn too_many_requests_sets_retry_after() {
        let response = AppError::TooManyRequests { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "42"
        );
        let json = response_json(response).await;
        assert_eq!(json["code"], "RATE_LIMITED");
        assert_eq!(json["details"]["retry_after"], 42);
    }

    #[tokio::test]
    async fn storage_failures_hide_detail() {
        let err: AppError = StorageError::Timeout(std::time::Duration::from_millis(5)).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = response_json(response).await;
        assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
        assert!(!json["error"].as_str().unwrap().contains("5ms"));
    }

    #[tokio::test]
    async fn storage_conflict_maps_to_409() {
        let err: AppError = StorageError::Conflict("duplicate student".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
