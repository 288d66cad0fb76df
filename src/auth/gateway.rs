//! Entry points used by the HTTP handlers: sign-in, refresh, logout and the
//! current-user lookup.

use secrecy::SecretString;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    config::AuthConfig,
    error::AuthError,
    google::CredentialVerifier,
    low_trust,
    models::{DeviceContext, User},
    resolver::IdentityResolver,
    sessions::{IssuedSession, SessionEngine},
    token::{AccessClaims, TokenIssuer},
};
use crate::store::AuthStore;

/// Tokens and profile returned by every successful sign-in or refresh.
pub struct AuthGrant {
    pub access_token: String,
    pub refresh_token: SecretString,
    pub user: User,
}

impl std::fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGrant")
            .field("access_token", &"***")
            .field("refresh_token", &"***")
            .field("user", &self.user)
            .finish()
    }
}

pub struct AuthService {
    store: Arc<dyn AuthStore>,
    verifier: Arc<dyn CredentialVerifier>,
    tokens: Arc<TokenIssuer>,
    resolver: IdentityResolver,
    sessions: SessionEngine,
}

impl AuthService {
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn AuthStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let tokens = Arc::new(TokenIssuer::new(config));
        Self {
            resolver: IdentityResolver::new(store.clone()),
            sessions: SessionEngine::new(store.clone(), tokens.clone(), config.refresh_ttl_days()),
            store,
            verifier,
            tokens,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn AuthStore> {
        &self.store
    }

    #[must_use]
    pub fn verifier(&self) -> &Arc<dyn CredentialVerifier> {
        &self.verifier
    }

    fn grant(&self, user: User, issued: IssuedSession) -> Result<AuthGrant, AuthError> {
        let access_token = self
            .tokens
            .issue_access_token(user.id, &user.email, user.role)?;
        Ok(AuthGrant {
            access_token,
            refresh_token: issued.refresh_token,
            user,
        })
    }

    /// Verify a Google ID token, resolve the user and open a session.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredential`], [`AuthError::DomainNotAllowed`] or storage failures.
    #[instrument(skip_all)]
    pub async fn sign_in_google(
        &self,
        id_token: &str,
        device: &DeviceContext,
    ) -> Result<AuthGrant, AuthError> {
        let claims = self.verifier.verify(id_token).await?;
        let user = self.resolver.resolve_google(&claims).await?;
        let issued = self.sessions.start(user.id, device).await?;
        info!(user_id = %user.id, session_id = %issued.session.id, "google sign-in");
        self.grant(user, issued)
    }

    /// Low-trust sign-in; see [`low_trust`].
    ///
    /// # Errors
    /// Storage failures.
    #[instrument(skip_all)]
    pub async fn sign_in_simple(
        &self,
        email: &str,
        name: Option<&str>,
        device: &DeviceContext,
    ) -> Result<AuthGrant, AuthError> {
        let user = low_trust::resolve_simple_user(self.store.as_ref(), email, name).await?;
        let issued = self.sessions.start(user.id, device).await?;
        info!(user_id = %user.id, session_id = %issued.session.id, "simple sign-in");
        self.grant(user, issued)
    }

    /// # Errors
    /// See [`SessionEngine::refresh`].
    pub async fn refresh(
        &self,
        refresh_token: &str,
        device: &DeviceContext,
    ) -> Result<AuthGrant, AuthError> {
        let rotation = self.sessions.refresh(refresh_token, device).await?;
        self.grant(rotation.user, rotation.session)
    }

    /// # Errors
    /// See [`SessionEngine::logout`].
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.sessions.logout(refresh_token).await
    }

    /// # Errors
    /// [`AuthError::InvalidCredential`] for invalid or expired tokens.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.tokens.verify_access_token(token)
    }

    /// # Errors
    /// [`AuthError::NotFound`] when the user no longer exists.
    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.store
            .find_user_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound("user"))
    }
}
