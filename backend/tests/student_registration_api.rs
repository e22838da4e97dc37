use axum::http::{Method, StatusCode};
use chrono::Utc;
use serde_json::json;

use rollcall_backend::models::qr_payload::QrPayload;

mod support;

use support::{peer, post_json, request, TestApp};

#[tokio::test]
async fn registration_returns_student_and_scannable_code() {
    let app = TestApp::new();

    let response = app
        .send(post_json(
            "/api/students/register",
            None,
            json!({
                "student_id_number": " 2023-00042 ",
                "first_name": "Grace",
                "last_name": "Hopper",
                "program_name": "",
                "year": 3,
            }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let body = response.json();
    assert_eq!(body["student"]["student_id_number"], "2023-00042");
    assert!(body["student"]["program_name"].is_null());
    assert_eq!(body["identity"]["studentIdNumber"], "2023-00042");
    assert!(body["qr_svg_data_url"]
        .as_str()
        .unwrap_or_default()
        .starts_with("data:image/svg+xml;base64,"));

    let payload = body["payload"].as_str().expect("payload");
    match app.state.codec.decode(payload, Utc::now()).expect("decode") {
        QrPayload::Student(identity) => {
            assert_eq!(identity.student_id_number, "2023-00042");
            assert_eq!(identity.last_name, "Hopper");
        }
        other => panic!("expected student payload, got {:?}", other),
    }
}

#[tokio::test]
async fn duplicate_student_number_conflicts() {
    let app = TestApp::new();
    let body = json!({
        "student_id_number": "2023-00043",
        "first_name": "Alan",
        "last_name": "Turing",
    });

    let first = app
        .send(post_json("/api/students/register", None, body.clone()))
        .await;
    assert_eq!(first.status, StatusCode::CREATED);

    let second = app
        .send(post_json("/api/students/register", None, body))
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_registration_is_rejected_with_field_errors() {
    let app = TestApp::new();

    let response = app
        .send(post_json(
            "/api/students/register",
            None,
            json!({
                "student_id_number": "no spaces allowed",
                "first_name": "",
                "last_name": "Hamilton",
                "year": 42,
            }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let body = response.json();
    assert_eq!(body["code"], "VALIDATION_ERROR");
    let errors = body["details"]["errors"].as_array().expect("errors");
    assert_eq!(errors.len(), 3);
}

#[tokio::test]
async fn registration_is_limited_per_origin() {
    let app = TestApp::new();
    let register = |n: u32, from: u8| {
        request(
            Method::POST,
            "/api/students/register",
            None,
            Some(json!({
                "student_id_number": format!("2023-{:05}", n),
                "first_name": "Katherine",
                "last_name": "Johnson",
            })),
            peer(from),
        )
    };

    for n in 0..3 {
        let response = app.send(register(n, 7)).await;
        assert_eq!(response.status, StatusCode::CREATED);
    }

    let blocked = app.send(register(3, 7)).await;
    assert_eq!(blocked.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(blocked.header("retry-after").is_some());

    let other_origin = app.send(register(4, 8)).await;
    assert_eq!(other_origin.status, StatusCode::CREATED);
}
