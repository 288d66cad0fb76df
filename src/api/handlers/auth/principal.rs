//! Authenticated principal extraction from `Authorization: Bearer <access token>`.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::Response,
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::utils::{extract_bearer_token, message_response};
use crate::auth::{AuthService, Role};

/// Caller identity taken from a verified access token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_bearer_token(&parts.headers) else {
            return Err(message_response(
                StatusCode::UNAUTHORIZED,
                "Missing or invalid token",
            ));
        };
        let Some(auth) = parts.extensions.get::<Arc<AuthService>>() else {
            error!("AuthService extension missing from router");
            return Err(message_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ));
        };

        auth.verify_access_token(&token)
            .map(|claims| Self {
                user_id: claims.sub,
                email: claims.email,
                role: claims.role,
            })
            .map_err(|_| message_response(StatusCode::UNAUTHORIZED, "Invalid or expired token"))
    }
}
