pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod types;
pub mod utils;
pub mod validation;

use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{config::Config, docs::ApiDoc, state::AppState};

/// Full HTTP surface. Rate limiting runs before authentication so
/// unauthenticated floods are counted too.
pub fn build_router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_api_routes = Router::new()
        .route(
            "/api/sessions/{id}/status",
            get(handlers::sessions::session_status),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_api,
        ));

    let registration_routes = Router::new()
        .route(
            "/api/students/register",
            post(handlers::students::register_student),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_registration,
        ));

    // Scanning (organizer or student, scan limiter)
    let organizer_scan_routes = Router::new()
        .route(
            "/api/attendance/scan",
            post(handlers::attendance::scan_attendance),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_organizer,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_scan,
        ));

    let student_scan_routes = Router::new()
        .route(
            "/api/attendance/self-scan",
            post(handlers::attendance::self_scan),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_student,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_scan,
        ));

    // Organizer/admin management routes
    let organizer_routes = Router::new()
        .route(
            "/api/sessions/{id}",
            axum::routing::put(handlers::sessions::update_session_windows),
        )
        .route("/api/sessions/{id}/qr", get(handlers::sessions::session_qr))
        .route(
            "/api/sessions/{id}/deactivate",
            post(handlers::sessions::deactivate_session),
        )
        .route(
            "/api/sessions/{id}/attendance",
            get(handlers::attendance::list_session_attendance),
        )
        .route(
            "/api/sessions/{id}/attendance/export",
            get(handlers::attendance::export_session_attendance),
        )
        .route(
            "/api/sessions/{id}/activity",
            get(handlers::attendance::list_session_activity),
        )
        .route("/api/events", post(handlers::events::create_event))
        .route(
            "/api/events/{id}/sessions",
            post(handlers::events::create_session),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_organizer,
        ))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_api,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/api/health", get(handlers::health::health))
        .merge(public_api_routes)
        .merge(registration_routes)
        .merge(organizer_scan_routes)
        .merge(student_scan_routes)
        .merge(organizer_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_id))
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(middleware::log_error_responses))
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(24 * 60 * 60));

    if config.cors_allow_origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}
