//! Refresh-token sessions: creation on sign-in, rotate-on-use, and logout.
//!
//! A session is `active` until it is revoked or its `expires_at` passes; both are
//! terminal. Refresh checks revocation and expiry before the secret, so replaying a
//! token that was already rotated fails as an invalid session rather than a mismatch.

use chrono::{Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    error::AuthError,
    models::{DeviceContext, NewSession, Session, User},
    token::{RefreshToken, TokenIssuer},
};
use crate::store::AuthStore;

/// A session together with the only copy of its client-facing refresh token.
pub struct IssuedSession {
    pub session: Session,
    pub refresh_token: SecretString,
}

/// Outcome of a successful refresh.
pub struct Rotation {
    pub user: User,
    pub session: IssuedSession,
}

pub struct SessionEngine {
    store: Arc<dyn AuthStore>,
    tokens: Arc<TokenIssuer>,
    refresh_ttl: Duration,
}

impl SessionEngine {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>, tokens: Arc<TokenIssuer>, refresh_ttl_days: u32) -> Self {
        Self {
            store,
            tokens,
            refresh_ttl: Duration::days(i64::from(refresh_ttl_days)),
        }
    }

    fn new_session(
        &self,
        user_id: Uuid,
        device: &DeviceContext,
        replaced_session_id: Option<Uuid>,
    ) -> Result<(NewSession, SecretString), AuthError> {
        let expires_at = Utc::now()
            .checked_add_signed(self.refresh_ttl)
            .ok_or_else(|| AuthError::Internal("refresh session expiry out of range".to_string()))?;
        let secret = self.tokens.issue_refresh_secret()?;
        let session = NewSession {
            id: Uuid::new_v4(),
            user_id,
            refresh_token_hash: secret.hash,
            user_agent: device.user_agent.clone(),
            ip: device.ip.clone(),
            expires_at,
            replaced_session_id,
        };
        Ok((session, secret.secret))
    }

    /// Create a fresh session for `user_id`.
    ///
    /// # Errors
    /// [`AuthError::Storage`] or [`AuthError::Internal`] (RNG, expiry overflow).
    #[instrument(skip(self, device))]
    pub async fn start(
        &self,
        user_id: Uuid,
        device: &DeviceContext,
    ) -> Result<IssuedSession, AuthError> {
        let (next, secret) = self.new_session(user_id, device, None)?;
        let session = self.store.create_session(&next).await?;
        debug!(session_id = %session.id, "session created");
        Ok(IssuedSession {
            refresh_token: RefreshToken::compose(session.id, &secret),
            session,
        })
    }

    /// Exchange a refresh token for a new one, revoking the presented session.
    ///
    /// # Errors
    /// - [`AuthError::MalformedToken`] before any storage access.
    /// - [`AuthError::InvalidOrExpiredSession`] for unknown, revoked or expired sessions,
    ///   and when a concurrent refresh rotated the session first.
    /// - [`AuthError::TokenMismatch`] after revoking the session.
    #[instrument(skip_all)]
    pub async fn refresh(
        &self,
        raw_token: &str,
        device: &DeviceContext,
    ) -> Result<Rotation, AuthError> {
        let token = RefreshToken::parse(raw_token)?;

        let session = self
            .store
            .find_session(token.session_id)
            .await?
            .filter(|session| session.is_active_at(Utc::now()))
            .ok_or(AuthError::InvalidOrExpiredSession)?;

        if !self
            .tokens
            .verify_refresh_secret(token.secret.expose_secret(), &session.refresh_token_hash)?
        {
            self.store.revoke_session(session.id).await?;
            warn!(
                session_id = %session.id,
                user_id = %session.user_id,
                "refresh secret mismatch, session revoked"
            );
            return Err(AuthError::TokenMismatch);
        }

        let user = self
            .store
            .find_user_by_id(session.user_id)
            .await?
            .ok_or(AuthError::InvalidOrExpiredSession)?;

        let device = DeviceContext {
            ip: device.ip.clone().or_else(|| session.ip.clone()),
            user_agent: device
                .user_agent
                .clone()
                .or_else(|| session.user_agent.clone()),
        };
        let (next, secret) = self.new_session(user.id, &device, Some(session.id))?;

        let Some(rotated) = self.store.rotate_session(session.id, &next).await? else {
            debug!(session_id = %session.id, "session rotated concurrently");
            return Err(AuthError::InvalidOrExpiredSession);
        };
        debug!(from = %session.id, to = %rotated.id, "session rotated");

        Ok(Rotation {
            user,
            session: IssuedSession {
                refresh_token: RefreshToken::compose(rotated.id, &secret),
                session: rotated,
            },
        })
    }

    /// Revoke the session named by the token prefix. Unknown or already revoked
    /// sessions are not errors.
    ///
    /// # Errors
    /// [`AuthError::MalformedToken`] when the prefix is empty; [`AuthError::Storage`].
    #[instrument(skip_all)]
    pub async fn logout(&self, raw_token: &str) -> Result<(), AuthError> {
        let prefix = raw_token
            .split_once('.')
            .map_or(raw_token, |(prefix, _)| prefix);
        if prefix.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        let Ok(session_id) = Uuid::parse_str(prefix) else {
            debug!("logout with a prefix that names no session");
            return Ok(());
        };
        let revoked = self.store.revoke_session(session_id).await?;
        debug!(session_id = %session_id, revoked, "logout");
        Ok(())
    }
}
