//! Request authentication.
//!
//! Two layers: a pre-shared key check on every `/api` call, then the
//! identity forwarded by the upstream gateway, turned into a [`Session`].

use axum::{
    extract::Request,
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;

use crate::errors::{AppError, ErrorResponse};
use crate::models::Username;

/// Header name for the API key.
pub const API_KEY_HEADER: &str = "x-api-key";
/// Authenticated username, set by the gateway.
pub const USER_HEADER: &str = "x-user-name";
/// Comma-separated authorization scope (department codes), set by the gateway.
pub const ROLES_HEADER: &str = "x-user-roles";

/// Identity of the caller for the duration of one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub username: Username,
    pub roles: Vec<String>,
}

impl Session {
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let username = headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        let roles: Vec<String> = headers
            .get(ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            username: Username::from(username),
            roles,
        })
    }
}

/// PSK authentication layer function that takes the expected PSK as a parameter.
pub async fn psk_auth_layer(
    expected_psk: Option<String>,
    request: Request,
    next: Next,
) -> Response {
    // If no PSK is configured, allow all requests (dev mode)
    let Some(expected) = expected_psk else {
        return next.run(request).await;
    };

    // x-api-key first, then a bearer token
    let matches = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer "))
        })
        .map(|key| constant_time_compare(key, &expected));

    match matches {
        Some(true) => next.run(request).await,
        Some(false) => unauthorized_response("Invalid API key"),
        None => unauthorized_response("Missing or invalid API key"),
    }
}

/// Attach the caller's [`Session`] to the request, or reject it.
pub async fn session_layer(mut request: Request, next: Next) -> Response {
    match Session::from_headers(request.headers()) {
        Some(session) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        None => unauthorized_response("Missing authenticated user"),
    }
}

/// Perform constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorResponse::new(&AppError::Unauthorized(message.to_string()), 0);
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
