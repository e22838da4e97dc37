use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;

use rollcall_backend::{
    models::principal::Role,
    repositories::{activity_log::ActivityLogFilters, ActivityLogRepositoryTrait},
    types::PrincipalId,
};

mod support;

use support::{
    get, organizer_token, post_json, seed_open_session, seed_session_at, seed_student,
    student_token, token_for, TestApp,
};

fn student_payload(app: &TestApp, student: &rollcall_backend::models::student::Student) -> String {
    app.state
        .codec
        .encode_student(&student.identity(Utc::now()))
        .expect("encode student")
}

#[tokio::test]
async fn organizer_scan_records_time_in_then_reports_duplicate() {
    let app = TestApp::new();
    let (_, session) = seed_open_session(&app.store).await;
    let student = seed_student(&app.store, "2024-0001").await;
    let (organizer_id, token) = organizer_token();
    let body = json!({
        "payload": student_payload(&app, &student),
        "session_id": session.id,
        "organizer_id": organizer_id,
    });

    let first = app
        .send(post_json("/api/attendance/scan", Some(&token), body.clone()))
        .await;
    assert_eq!(first.status, StatusCode::CREATED);
    let json = first.json();
    assert_eq!(json["status"], "recorded");
    assert_eq!(json["scan_kind"], "time_in");
    assert_eq!(json["record"]["student_id"], json!(student.id));
    assert_eq!(json["record"]["scanned_by"], json!(organizer_id));

    let second = app
        .send(post_json("/api/attendance/scan", Some(&token), body))
        .await;
    assert_eq!(second.status, StatusCode::OK);
    let json = second.json();
    assert_eq!(json["status"], "duplicate");
    assert_eq!(json["record"]["id"], first.json()["record"]["id"]);
}

#[tokio::test]
async fn garbage_payload_is_rejected_and_logged_by_digest() {
    let app = TestApp::new();
    let (_, session) = seed_open_session(&app.store).await;
    let (organizer_id, token) = organizer_token();

    let response = app
        .send(post_json(
            "/api/attendance/scan",
            Some(&token),
            json!({
                "payload": "definitely not a qr payload",
                "session_id": session.id,
                "organizer_id": organizer_id,
            }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["reason"], "invalid_payload");

    let logged = ActivityLogRepositoryTrait::list_for_session(
        &app.store,
        session.id,
        ActivityLogFilters::default(),
        50,
        0,
    )
    .await
    .expect("list activity");
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].outcome.0.kind(), "invalid_payload");
    assert_eq!(logged[0].payload_digest.len(), 64);
    assert!(!logged[0].payload_digest.contains("qr payload"));
}

#[tokio::test]
async fn scan_between_windows_is_rejected_as_outside_window() {
    let app = TestApp::new();
    let now = Utc::now();
    let (_, session) = seed_session_at(
        &app.store,
        now - Duration::minutes(30),
        now - Duration::minutes(20),
        Some((now + Duration::minutes(20), now + Duration::minutes(30))),
    )
    .await;
    let student = seed_student(&app.store, "2024-0002").await;
    let (organizer_id, token) = organizer_token();

    let response = app
        .send(post_json(
            "/api/attendance/scan",
            Some(&token),
            json!({
                "payload": student_payload(&app, &student),
                "session_id": session.id,
                "organizer_id": organizer_id,
            }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let json = response.json();
    assert_eq!(json["reason"], "outside_window");
    assert_eq!(json["scan_kind"], "outside_window");
}

#[tokio::test]
async fn unknown_session_returns_not_found() {
    let app = TestApp::new();
    let student = seed_student(&app.store, "2024-0003").await;
    let (organizer_id, token) = organizer_token();

    let response = app
        .send(post_json(
            "/api/attendance/scan",
            Some(&token),
            json!({
                "payload": student_payload(&app, &student),
                "session_id": uuid::Uuid::new_v4(),
                "organizer_id": organizer_id,
            }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scan_requires_organizer_token() {
    let app = TestApp::new();
    let (_, session) = seed_open_session(&app.store).await;
    let student = seed_student(&app.store, "2024-0004").await;
    let body = json!({
        "payload": student_payload(&app, &student),
        "session_id": session.id,
        "organizer_id": PrincipalId::new(),
    });

    let anonymous = app
        .send(post_json("/api/attendance/scan", None, body.clone()))
        .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let as_student = app
        .send(post_json(
            "/api/attendance/scan",
            Some(&student_token(&student)),
            body,
        ))
        .await;
    assert_eq!(as_student.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn organizer_cannot_scan_under_another_organizer_id() {
    let app = TestApp::new();
    let (_, session) = seed_open_session(&app.store).await;
    let student = seed_student(&app.store, "2024-0005").await;
    let (_, token) = organizer_token();

    let response = app
        .send(post_json(
            "/api/attendance/scan",
            Some(&token),
            json!({
                "payload": student_payload(&app, &student),
                "session_id": session.id,
                "organizer_id": PrincipalId::new(),
            }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let admin_id = PrincipalId::new();
    let admin = token_for(admin_id, Role::Admin);
    let response = app
        .send(post_json(
            "/api/attendance/scan",
            Some(&admin),
            json!({
                "payload": student_payload(&app, &student),
                "session_id": session.id,
                "organizer_id": PrincipalId::new(),
            }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn student_self_scan_uses_session_qr() {
    let app = TestApp::new();
    let (_, session) = seed_open_session(&app.store).await;
    let student = seed_student(&app.store, "2024-0006").await;
    let (organizer_id, organizer) = organizer_token();

    let qr = app
        .send(get(
            &format!("/api/sessions/{}/qr", session.id),
            Some(&organizer),
        ))
        .await;
    assert_eq!(qr.status, StatusCode::OK);
    let qr = qr.json();
    assert!(qr["qr_svg_data_url"]
        .as_str()
        .unwrap_or_default()
        .starts_with("data:image/svg+xml;base64,"));
    let payload = qr["payload"].as_str().expect("payload").to_string();

    let token = student_token(&student);
    let response = app
        .send(post_json(
            "/api/attendance/self-scan",
            Some(&token),
            json!({ "payload": payload }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let json = response.json();
    assert_eq!(json["status"], "recorded");
    assert_eq!(json["record"]["scanned_by"], json!(organizer_id));

    let again = app
        .send(post_json(
            "/api/attendance/self-scan",
            Some(&token),
            json!({ "payload": payload }),
        ))
        .await;
    assert_eq!(again.status, StatusCode::OK);
    assert_eq!(again.json()["status"], "duplicate");
}

#[tokio::test]
async fn organizer_cannot_use_self_scan() {
    let app = TestApp::new();
    let (_, token) = organizer_token();

    let response = app
        .send(post_json(
            "/api/attendance/self-scan",
            Some(&token),
            json!({ "payload": "{}" }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn attendance_listing_and_export_reflect_scans() {
    let app = TestApp::new();
    let (_, session) = seed_open_session(&app.store).await;
    let student = seed_student(&app.store, "2024-0007").await;
    let (organizer_id, token) = organizer_token();

    let scan = app
        .send(post_json(
            "/api/attendance/scan",
            Some(&token),
            json!({
                "payload": student_payload(&app, &student),
                "session_id": session.id,
                "organizer_id": organizer_id,
            }),
        ))
        .await;
    assert_eq!(scan.status, StatusCode::CREATED);

    let listing = app
        .send(get(
            &format!("/api/sessions/{}/attendance?limit=10", session.id),
            Some(&token),
        ))
        .await;
    assert_eq!(listing.status, StatusCode::OK);
    let listing = listing.json();
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["data"][0]["student_id"], json!(student.id));

    let export = app
        .send(get(
            &format!("/api/sessions/{}/attendance/export", session.id),
            Some(&token),
        ))
        .await;
    assert_eq!(export.status, StatusCode::OK);
    assert!(export
        .header("content-type")
        .unwrap_or_default()
        .starts_with("text/csv"));
    assert!(export
        .header("content-disposition")
        .unwrap_or_default()
        .contains(&session.id.to_string()));
    let csv = export.text();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap_or_default().starts_with("\"record_id\""));
    let row = lines.next().expect("one data row");
    assert!(row.contains("\"2024-0007\""));
    assert!(row.contains("\"Lovelace\""));
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn activity_endpoint_filters_by_outcome() {
    let app = TestApp::new();
    let (_, session) = seed_open_session(&app.store).await;
    let student = seed_student(&app.store, "2024-0008").await;
    let (organizer_id, token) = organizer_token();
    let body = json!({
        "payload": student_payload(&app, &student),
        "session_id": session.id,
        "organizer_id": organizer_id,
    });
    for _ in 0..3 {
        app.send(post_json("/api/attendance/scan", Some(&token), body.clone()))
            .await;
    }

    let all = app
        .send(get(
            &format!("/api/sessions/{}/activity", session.id),
            Some(&token),
        ))
        .await;
    assert_eq!(all.status, StatusCode::OK);
    let all = all.json();
    assert_eq!(all["data"].as_array().map(Vec::len), Some(3));
    assert_eq!(all["total"], 3);

    let duplicates = app
        .send(get(
            &format!("/api/sessions/{}/activity?outcome=duplicate", session.id),
            Some(&token),
        ))
        .await;
    let duplicates = duplicates.json();
    assert_eq!(duplicates["total"], 2);
    let entries = duplicates["data"].as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert!(entries
        .iter()
        .all(|entry| entry["outcome"]["kind"] == "duplicate"));
    assert!(entries
        .iter()
        .all(|entry| entry["actor_id"] == json!(organizer_id)));

    let first_page = app
        .send(get(
            &format!("/api/sessions/{}/activity?limit=1&offset=1", session.id),
            Some(&token),
        ))
        .await
        .json();
    assert_eq!(first_page["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(first_page["total"], 3);
    assert_eq!(first_page["limit"], 1);
    assert_eq!(first_page["offset"], 1);
}
