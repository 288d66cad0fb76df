//! Typed failures of the auth core and their HTTP-equivalent status codes.

use axum::http::StatusCode;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad or unverifiable external credential, or an invalid access token.
    #[error("{0}")]
    InvalidCredential(String),
    #[error("Institutional domain is not allowed")]
    DomainNotAllowed,
    #[error("Invalid refresh token format")]
    MalformedToken,
    #[error("Refresh session is invalid or expired")]
    InvalidOrExpiredSession,
    /// The presented secret did not match; the session has already been revoked.
    #[error("Refresh token mismatch")]
    TokenMismatch,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("storage failure: {0}")]
    Storage(StoreError),
    /// Anything unexpected (RNG, signing). Never rendered verbatim.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredential(_)
            | Self::MalformedToken
            | Self::InvalidOrExpiredSession
            | Self::TokenMismatch => StatusCode::UNAUTHORIZED,
            Self::DomainNotAllowed => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AuthError::InvalidCredential("x".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::DomainNotAllowed.status(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::MalformedToken.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::InvalidOrExpiredSession.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::TokenMismatch.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::NotFound("user").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::Storage(StoreError::Unavailable("down".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_not_found_maps_to_not_found() {
        let err = AuthError::from(StoreError::NotFound("user"));
        assert!(matches!(err, AuthError::NotFound("user")));
        assert_eq!(err.to_string(), "user not found");
    }
}
