//! Sign-in endpoints.
//!
//! Flow Overview:
//! 1) Validate the body (400 with per-field errors; simple sign-in needs an email and a name).
//! 2) Google: verify the ID token; simple: take the email at face value.
//! 3) Resolve the user, open a session and return the token pair.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::{
    types::{AuthResponse, ErrorResponse, FieldError, GoogleSignInRequest, SimpleSignInRequest},
    utils::{Fallback, auth_error_response, device_context, invalid_body, parse_body, valid_email},
};
use crate::auth::{AuthService, low_trust::normalize_email};

#[utoipa::path(
    post,
    path = "/v1/auth/google",
    request_body = GoogleSignInRequest,
    responses(
        (status = 200, description = "Signed in with a Google ID token", body = AuthResponse),
        (status = 400, description = "Invalid body", body = ErrorResponse),
        (status = 401, description = "Invalid Google credential", body = ErrorResponse),
        (status = 403, description = "Institutional domain is not allowed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn google_sign_in(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    payload: Result<Json<GoogleSignInRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let id_token = request.id_token.trim();
    if id_token.is_empty() {
        return invalid_body(vec![FieldError::new("idToken", "is required")]);
    }

    match auth.sign_in_google(id_token, &device_context(&headers)).await {
        Ok(grant) => (StatusCode::OK, Json(AuthResponse::from(grant))).into_response(),
        Err(err) => auth_error_response(&err, Fallback::Unauthorized("Authentication failed")),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/simple",
    request_body = SimpleSignInRequest,
    responses(
        (status = 200, description = "Signed in by email without proof of identity", body = AuthResponse),
        (status = 400, description = "Invalid body", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn simple_sign_in(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    payload: Result<Json<SimpleSignInRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let email = normalize_email(&request.email);
    let name = request.name.trim();

    let mut errors = Vec::new();
    if email.is_empty() {
        errors.push(FieldError::new("email", "is required"));
    } else if !valid_email(&email) {
        errors.push(FieldError::new("email", "must be a valid email"));
    }
    if name.is_empty() {
        errors.push(FieldError::new("name", "is required"));
    }
    if !errors.is_empty() {
        return invalid_body(errors);
    }

    match auth
        .sign_in_simple(&email, Some(name), &device_context(&headers))
        .await
    {
        Ok(grant) => (StatusCode::OK, Json(AuthResponse::from(grant))).into_response(),
        Err(err) => auth_error_response(&err, Fallback::Unauthorized("Authentication failed")),
    }
}
