use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::{
    models::principal::{Principal, Role},
    state::AppState,
    utils::jwt::verify_access_token,
};

/// Any authenticated principal.
pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = authenticate_request(request.headers(), &state.config.jwt_secret)?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

// Auth + require organizer or admin role
pub async fn auth_organizer(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = authenticate_request(request.headers(), &state.config.jwt_secret)?;
    if !principal.role.can_organize() {
        tracing::debug!(principal_id = %principal.id, role = %principal.role, "Organizer route refused");
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

// Auth + require student role for self-scan
pub async fn auth_student(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let principal = authenticate_request(request.headers(), &state.config.jwt_secret)?;
    if principal.role != Role::Student {
        tracing::debug!(principal_id = %principal.id, role = %principal.role, "Student route refused");
        return Err(StatusCode::FORBIDDEN);
    }

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    if let Some(rest) = header.strip_prefix("Bearer ") {
        return Some(rest);
    }
    if let Some(space_idx) = header.find(' ') {
        let (scheme, rest) = header.split_at(space_idx);
        if scheme.eq_ignore_ascii_case("bearer") {
            return Some(rest.trim_start());
        }
    }
    None
}

fn authenticate_request(headers: &HeaderMap, secret: &str) -> Result<Principal, StatusCode> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .filter(|token| !token.is_empty())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = verify_access_token(token, secret).map_err(|err| {
        tracing::debug!(error = %err, "Rejected bearer token");
        StatusCode::UNAUTHORIZED
    })?;

    claims.principal().map_err(|err| {
        tracing::debug!(error = %err, "Token subject is not a principal id");
        StatusCode::UNAUTHORIZED
    })
}
