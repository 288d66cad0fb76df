//! In-process store. A single mutex serializes every operation, which is what makes
//! `rotate_session` atomic here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AuthStore, StoreError};
use crate::auth::models::{
    AuthIdentity, NewIdentity, NewSession, NewUser, ProfilePatch, Role, Session, User,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    identities: Vec<AuthIdentity>,
    sessions: HashMap<Uuid, Session>,
}

impl State {
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|user| user.email == email && Some(user.id) != except)
    }

    fn identity_taken(&self, identity: &NewIdentity) -> bool {
        self.identities.iter().any(|existing| {
            existing.provider == identity.provider
                && existing.provider_user_id == identity.provider_user_id
        })
    }

    fn push_identity(&mut self, user_id: Uuid, identity: &NewIdentity, now: DateTime<Utc>) {
        self.identities.push(AuthIdentity {
            id: Uuid::new_v4(),
            user_id,
            provider: identity.provider.clone(),
            provider_user_id: identity.provider_user_id.clone(),
            email_at_provider: identity.email_at_provider.clone(),
            hosted_domain: identity.hosted_domain.clone(),
            created_at: now,
        });
    }

    fn patch_user(&mut self, id: Uuid, patch: &ProfilePatch) -> Result<User, StoreError> {
        if let Some(email) = &patch.email
            && self.email_taken(email, Some(id))
        {
            return Err(StoreError::Conflict);
        }
        let user = self.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
        patch.apply(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    operations: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of store calls served so far.
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    async fn lock(&self) -> tokio::sync::MutexGuard<'_, State> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        self.state.lock().await
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let _state = self.lock().await;
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let state = self.lock().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let state = self.lock().await;
        Ok(state.users.values().find(|user| user.email == email).cloned())
    }

    async fn find_user_by_identity(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let state = self.lock().await;
        let user = state
            .identities
            .iter()
            .find(|identity| {
                identity.provider == provider && identity.provider_user_id == provider_user_id
            })
            .and_then(|identity| state.users.get(&identity.user_id))
            .cloned();
        Ok(user)
    }

    async fn identities_for_user(&self, user_id: Uuid) -> Result<Vec<AuthIdentity>, StoreError> {
        let state = self.lock().await;
        Ok(state
            .identities
            .iter()
            .filter(|identity| identity.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create_user(
        &self,
        user: &NewUser,
        identity: Option<&NewIdentity>,
    ) -> Result<User, StoreError> {
        let mut state = self.lock().await;
        if state.email_taken(&user.email, None) || identity.is_some_and(|i| state.identity_taken(i))
        {
            return Err(StoreError::Conflict);
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
            role: Role::Student,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        if let Some(identity) = identity {
            state.push_identity(created.id, identity, now);
        }
        Ok(created)
    }

    async fn update_user_profile(
        &self,
        id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<User, StoreError> {
        let mut state = self.lock().await;
        state.patch_user(id, patch)
    }

    async fn link_identity(
        &self,
        user_id: Uuid,
        patch: &ProfilePatch,
        identity: &NewIdentity,
    ) -> Result<User, StoreError> {
        let mut state = self.lock().await;
        if state.identity_taken(identity) {
            return Err(StoreError::Conflict);
        }
        let user = state.patch_user(user_id, patch)?;
        state.push_identity(user_id, identity, Utc::now());
        Ok(user)
    }

    async fn create_session(&self, session: &NewSession) -> Result<Session, StoreError> {
        let mut state = self.lock().await;
        if state.sessions.contains_key(&session.id) {
            return Err(StoreError::Conflict);
        }
        let created = session.clone().into_session(Utc::now());
        state.sessions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let state = self.lock().await;
        Ok(state.sessions.get(&id).cloned())
    }

    async fn revoke_session(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.lock().await;
        match state.sessions.get_mut(&id) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate_session(
        &self,
        old: Uuid,
        next: &NewSession,
    ) -> Result<Option<Session>, StoreError> {
        let mut state = self.lock().await;
        let now = Utc::now();
        let Some(current) = state.sessions.get_mut(&old) else {
            return Ok(None);
        };
        if !current.is_active_at(now) {
            return Ok(None);
        }
        current.revoked_at = Some(now);

        let created = next.clone().into_session(now);
        state.sessions.insert(created.id, created.clone());
        Ok(Some(created))
    }

    async fn delete_expired_sessions(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.lock().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| session.expires_at >= cutoff);
        Ok(u64::try_from(before - state.sessions.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use chrono::Duration;
    use std::sync::Arc;

    fn new_session(user_id: Uuid, expires_in: Duration) -> NewSession {
        NewSession {
            id: Uuid::new_v4(),
            user_id,
            refresh_token_hash: vec![7; 32],
            user_agent: Some("test-agent".to_string()),
            ip: Some("10.0.0.1".to_string()),
            expires_at: Utc::now() + expires_in,
            replaced_session_id: None,
        }
    }

    async fn seeded_user(store: &MemoryStore) -> Result<User> {
        let user = store
            .create_user(
                &NewUser {
                    email: "lee@university.edu".to_string(),
                    name: Some("Lee".to_string()),
                    avatar_url: None,
                },
                None,
            )
            .await?;
        Ok(user)
    }

    #[tokio::test]
    async fn create_user_rejects_duplicate_email() -> Result<()> {
        let store = MemoryStore::new();
        seeded_user(&store).await?;
        let duplicate = store
            .create_user(
                &NewUser {
                    email: "lee@university.edu".to_string(),
                    name: None,
                    avatar_url: None,
                },
                None,
            )
            .await;
        assert!(matches!(duplicate, Err(StoreError::Conflict)));
        Ok(())
    }

    #[tokio::test]
    async fn link_identity_rejects_taken_pair() -> Result<()> {
        let store = MemoryStore::new();
        let user = seeded_user(&store).await?;
        let identity = NewIdentity {
            provider: "google".to_string(),
            provider_user_id: "sub-1".to_string(),
            email_at_provider: user.email.clone(),
            hosted_domain: None,
        };
        store
            .link_identity(user.id, &ProfilePatch::default(), &identity)
            .await?;
        let again = store
            .link_identity(user.id, &ProfilePatch::default(), &identity)
            .await;
        assert!(matches!(again, Err(StoreError::Conflict)));
        assert_eq!(store.identities_for_user(user.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn revoke_session_is_idempotent() -> Result<()> {
        let store = MemoryStore::new();
        let user = seeded_user(&store).await?;
        let session = store
            .create_session(&new_session(user.id, Duration::days(1)))
            .await?;
        assert!(store.revoke_session(session.id).await?);
        assert!(!store.revoke_session(session.id).await?);
        assert!(!store.revoke_session(Uuid::new_v4()).await?);
        Ok(())
    }

    #[tokio::test]
    async fn rotate_session_refuses_inactive_session() -> Result<()> {
        let store = MemoryStore::new();
        let user = seeded_user(&store).await?;
        let expired = store
            .create_session(&new_session(user.id, Duration::seconds(-1)))
            .await?;
        let next = new_session(user.id, Duration::days(1));
        assert!(store.rotate_session(expired.id, &next).await?.is_none());
        assert!(store.find_session(next.id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_rotation_yields_one_child() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user = seeded_user(&store).await?;
        let parent = store
            .create_session(&new_session(user.id, Duration::days(1)))
            .await?;
        let parent_id = parent.id;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let next = new_session(user.id, Duration::days(1));
            handles.push(tokio::spawn(async move {
                store.rotate_session(parent_id, &next).await
            }));
        }

        let mut children = 0;
        for handle in handles {
            if handle.await.context("rotation task panicked")??.is_some() {
                children += 1;
            }
        }
        assert_eq!(children, 1);
        Ok(())
    }

    #[tokio::test]
    async fn delete_expired_sessions_keeps_recent_rows() -> Result<()> {
        let store = MemoryStore::new();
        let user = seeded_user(&store).await?;
        let old = store
            .create_session(&new_session(user.id, Duration::days(-10)))
            .await?;
        let live = store
            .create_session(&new_session(user.id, Duration::days(1)))
            .await?;
        let removed = store
            .delete_expired_sessions(Utc::now() - Duration::days(7))
            .await?;
        assert_eq!(removed, 1);
        assert!(store.find_session(old.id).await?.is_none());
        assert!(store.find_session(live.id).await?.is_some());
        Ok(())
    }
}
