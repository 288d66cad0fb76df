//! Authenticated self-service endpoint.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::debug;

use super::auth::{
    principal::Principal,
    types::{ErrorResponse, UserResponse},
    utils::{Fallback, auth_error_response},
};
use crate::auth::AuthService;

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user profile.", body = UserResponse),
        (status = 401, description = "Missing or invalid access token.", body = ErrorResponse),
        (status = 404, description = "User no longer exists.", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn get_me(principal: Principal, auth: Extension<Arc<AuthService>>) -> impl IntoResponse {
    debug!(
        user_id = %principal.user_id,
        email = %principal.email,
        role = %principal.role,
        "current user lookup"
    );
    match auth.current_user(principal.user_id).await {
        Ok(user) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Err(err) => auth_error_response(&err, Fallback::ServerError),
    }
}
