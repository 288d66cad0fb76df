//! Persistence for users, provider identities and refresh-token sessions.
//!
//! The auth core only talks to [`AuthStore`]. Two implementations ship:
//!
//! - [`PgStore`]: Postgres via `sqlx`, used by the server.
//! - [`MemoryStore`]: a mutex-guarded in-process store for tests and local runs.
//!
//! Both keep rotation atomic: [`AuthStore::rotate_session`] revokes the old session
//! only if it is still active and inserts the successor in the same unit of work, so
//! two refreshes racing on one token cannot both produce a live child.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::models::{
    AuthIdentity, NewIdentity, NewSession, NewUser, ProfilePatch, Session, User,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write (email or provider identity).
    #[error("unique constraint violation")]
    Conflict,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A stored value could not be mapped onto the domain type.
    #[error("invalid stored row: {0}")]
    InvalidRow(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            Self::Conflict
        } else {
            Self::Database(err)
        }
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Round-trip to the backing store; used by health checks.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Resolve the user linked to `(provider, provider_user_id)`.
    async fn find_user_by_identity(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn identities_for_user(&self, user_id: Uuid) -> Result<Vec<AuthIdentity>, StoreError>;

    /// Create a user, together with its first identity when given, atomically.
    async fn create_user(
        &self,
        user: &NewUser,
        identity: Option<&NewIdentity>,
    ) -> Result<User, StoreError>;

    async fn update_user_profile(&self, id: Uuid, patch: &ProfilePatch)
    -> Result<User, StoreError>;

    /// Apply `patch` and attach `identity` to an existing user atomically.
    async fn link_identity(
        &self,
        user_id: Uuid,
        patch: &ProfilePatch,
        identity: &NewIdentity,
    ) -> Result<User, StoreError>;

    async fn create_session(&self, session: &NewSession) -> Result<Session, StoreError>;

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError>;

    /// Set `revoked_at = now` if the session exists and is not revoked yet.
    /// Returns whether a row changed.
    async fn revoke_session(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Revoke `old` if it is still active and insert `next`, as one unit.
    /// Returns `None` (and inserts nothing) when `old` was no longer active.
    async fn rotate_session(
        &self,
        old: Uuid,
        next: &NewSession,
    ) -> Result<Option<Session>, StoreError>;

    /// Delete sessions that expired before `cutoff`. Returns the number removed.
    async fn delete_expired_sessions(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}
