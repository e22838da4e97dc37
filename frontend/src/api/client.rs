use reqwest::{header, Client, RequestBuilder};
use uuid::Uuid;

use crate::api::types::*;

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// `base_url` includes the `/api` prefix, e.g. `http://localhost:3000/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Organizer scan of a student identity code.
    pub async fn scan_attendance(&self, submission: &ScanSubmission) -> Result<ScanResult, ApiError> {
        let request = self
            .authorized(self.client.post(self.url("/attendance/scan")))
            .json(submission);
        self.send_scan(request).await
    }

    /// Student self-scan of a session context code.
    pub async fn self_scan(&self, payload: impl Into<String>) -> Result<ScanResult, ApiError> {
        let body = SelfScanSubmission {
            payload: payload.into(),
        };
        let request = self
            .authorized(self.client.post(self.url("/attendance/self-scan")))
            .json(&body);
        self.send_scan(request).await
    }

    pub async fn session_status(&self, session_id: Uuid) -> Result<SessionStatusResponse, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/sessions/{}/status", session_id)))
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        let (status, retry_after, body) = read_response(response).await?;
        if (200..300).contains(&status) {
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
        } else {
            Err(ApiError::from_response(status, retry_after, &body))
        }
    }

    async fn send_scan(&self, request: RequestBuilder) -> Result<ScanResult, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        let (status, retry_after, body) = read_response(response).await?;
        scan_result_from(status, retry_after, &body)
    }
}

async fn read_response(
    response: reqwest::Response,
) -> Result<(u16, Option<u64>, String), ApiError> {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Request(e.to_string()))?;
    Ok((status, retry_after, body))
}

/// Maps a scan endpoint response onto the operator-facing result.
///
/// 201 (recorded), 200 (duplicate) and 422 (rejected) all carry a scan
/// body; everything else is an [`ApiError`].
pub fn scan_result_from(
    status: u16,
    retry_after: Option<u64>,
    body: &str,
) -> Result<ScanResult, ApiError> {
    match status {
        200 | 201 | 422 => match serde_json::from_str::<ScanResponse>(body) {
            Ok(scan) => ScanResult::try_from(scan),
            Err(_) if status == 422 => Err(ApiError::from_response(status, retry_after, body)),
            Err(e) => Err(ApiError::Decode(e.to_string())),
        },
        _ => Err(ApiError::from_response(status, retry_after, body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "student_id": Uuid::new_v4(),
            "session_id": Uuid::new_v4(),
            "event_id": Uuid::new_v4(),
            "time_in": "2026-03-02T01:00:00Z",
            "time_out": "2026-03-02T08:05:00Z",
            "scanned_by": Uuid::new_v4(),
            "time_out_scanned_by": Uuid::new_v4(),
            "created_at": "2026-03-02T01:00:00Z",
            "updated_at": "2026-03-02T08:05:00Z"
        })
    }

    #[test]
    fn created_maps_to_recorded_and_ok_to_duplicate() {
        let recorded = json!({ "status": "recorded", "scan_kind": "time_out", "record": record() });
        let duplicate = json!({ "status": "duplicate", "scan_kind": "time_in", "record": record() });

        let first = scan_result_from(201, None, &recorded.to_string()).expect("recorded");
        assert!(matches!(
            first,
            ScanResult::Recorded {
                scan_kind: ScanKind::TimeOut,
                ..
            }
        ));
        let second = scan_result_from(200, None, &duplicate.to_string()).expect("duplicate");
        assert!(matches!(second, ScanResult::Duplicate { .. }));
    }

    #[test]
    fn unprocessable_maps_to_rejection() {
        let body = json!({ "status": "rejected", "reason": "outside_window", "scan_kind": "outside_window" });
        assert_eq!(
            scan_result_from(422, None, &body.to_string()),
            Ok(ScanResult::Rejected {
                reason: ScanRejectReason::OutsideWindow,
                scan_kind: Some(ScanKind::OutsideWindow),
            })
        );
    }

    #[test]
    fn unprocessable_without_scan_body_is_an_http_error() {
        let body = json!({ "error": "Unprocessable", "code": "UNPROCESSABLE" });
        assert_eq!(
            scan_result_from(422, None, &body.to_string()),
            Err(ApiError::Http {
                status: 422,
                message: "Unprocessable".into()
            })
        );
    }

    #[test]
    fn throttled_and_failed_scans_map_to_typed_errors() {
        let limited = json!({
            "error": "Too many requests",
            "code": "RATE_LIMITED",
            "details": { "retry_after": 30 }
        });
        assert_eq!(
            scan_result_from(429, Some(12), &limited.to_string()),
            Err(ApiError::RateLimited { retry_after: 12 })
        );
        assert_eq!(
            scan_result_from(401, None, ""),
            Err(ApiError::Unauthorized)
        );
        assert_eq!(scan_result_from(502, None, "bad gateway"), Err(ApiError::Unavailable));
    }

    #[test]
    fn malformed_success_body_is_a_decode_error() {
        assert!(matches!(
            scan_result_from(201, None, "<html>"),
            Err(ApiError::Decode(_))
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:3000/api/").with_token("t");
        assert_eq!(client.base_url(), "http://localhost:3000/api");
        assert_eq!(client.url("/attendance/scan"), "http://localhost:3000/api/attendance/scan");
    }
}
