//! Refresh-token endpoints: rotate-on-use refresh and logout.

use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::{
    types::{AuthResponse, ErrorResponse, FieldError, LogoutRequest, RefreshRequest},
    utils::{
        Fallback, auth_error_response, device_context, invalid_body, message_response, parse_body,
    },
};
use crate::auth::{AuthError, AuthService};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access and refresh token; the presented token is revoked", body = AuthResponse),
        (status = 400, description = "Invalid body", body = ErrorResponse),
        (status = 401, description = "Malformed, unknown, revoked, expired or mismatched refresh token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    auth: Extension<Arc<AuthService>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if request.refresh_token.is_empty() {
        return invalid_body(vec![FieldError::new("refreshToken", "is required")]);
    }

    match auth
        .refresh(&request.refresh_token, &device_context(&headers))
        .await
    {
        Ok(grant) => (StatusCode::OK, Json(AuthResponse::from(grant))).into_response(),
        Err(err) => auth_error_response(&err, Fallback::Unauthorized("Refresh failed")),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 204, description = "Session revoked (or already gone)"),
        (status = 400, description = "Invalid body or malformed refresh token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    auth: Extension<Arc<AuthService>>,
    payload: Result<Json<LogoutRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_body(payload) {
        Ok(request) => request,
        Err(response) => return response,
    };
    if request.refresh_token.is_empty() {
        return invalid_body(vec![FieldError::new("refreshToken", "is required")]);
    }

    match auth.logout(&request.refresh_token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(AuthError::MalformedToken) => message_response(
            StatusCode::BAD_REQUEST,
            &AuthError::MalformedToken.to_string(),
        ),
        Err(err) => auth_error_response(&err, Fallback::ServerError),
    }
}
