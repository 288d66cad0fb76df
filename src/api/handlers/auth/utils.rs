//! Shared helpers for auth handlers: device context, body validation and error rendering.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, USER_AGENT},
    },
    response::{IntoResponse, Response},
};
use regex::Regex;
use tracing::{error, warn};

use super::types::{ErrorResponse, FieldError};
use crate::auth::{AuthError, DeviceContext};

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Client IP from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn device_context(headers: &HeaderMap) -> DeviceContext {
    DeviceContext {
        ip: extract_client_ip(headers),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string),
    }
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// 400 `{message: "Invalid body", errors}`.
pub(crate) fn invalid_body(errors: Vec<FieldError>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            message: "Invalid body".to_string(),
            errors,
        }),
    )
        .into_response()
}

/// Unwrap a JSON body or render the rejection as an invalid body.
pub(crate) fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| invalid_body(vec![FieldError::new("body", &rejection.body_text())]))
}

pub(crate) fn message_response(status: StatusCode, message: &str) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// How an unexpected (internal) failure is shown to the client.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Fallback {
    /// Generic 401 with the given message; sign-in and refresh.
    Unauthorized(&'static str),
    /// Generic 500.
    ServerError,
}

/// Render an [`AuthError`] as `{message}` JSON, never exposing storage or internal detail.
pub(crate) fn auth_error_response(err: &AuthError, fallback: Fallback) -> Response {
    match err {
        AuthError::Storage(store_err) => {
            error!("auth storage failure: {store_err}");
            message_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
        AuthError::Internal(detail) => {
            error!("unexpected auth failure: {detail}");
            match fallback {
                Fallback::Unauthorized(message) => {
                    message_response(StatusCode::UNAUTHORIZED, message)
                }
                Fallback::ServerError => {
                    message_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            }
        }
        expected => {
            warn!("auth request rejected: {expected}");
            message_response(expected.status(), &expected.to_string())
        }
    }
}
