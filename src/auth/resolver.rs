//! Maps verified Google claims onto a local user.
//!
//! Lookup order: provider identity, then email (account linking), then creation.
//! Linking by email trusts Google's verified-email assertion.

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{
    error::AuthError,
    google::{GOOGLE_PROVIDER, VerifiedClaims},
    models::{NewIdentity, NewUser, ProfilePatch, User},
};
use crate::store::{AuthStore, StoreError};

pub struct IdentityResolver {
    store: Arc<dyn AuthStore>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(store: Arc<dyn AuthStore>) -> Self {
        Self { store }
    }

    /// Find or create the user for `claims`, refreshing its profile.
    ///
    /// A unique-constraint race (two first sign-ins at once) is retried once from the
    /// lookup, which then finds the row the other request created.
    ///
    /// # Errors
    /// [`AuthError::Storage`] on store failures.
    #[instrument(skip_all, fields(provider = GOOGLE_PROVIDER))]
    pub async fn resolve_google(&self, claims: &VerifiedClaims) -> Result<User, AuthError> {
        match self.try_resolve_google(claims).await {
            Err(AuthError::Storage(StoreError::Conflict)) => {
                warn!("identity resolution raced with a concurrent sign-in, retrying");
                self.try_resolve_google(claims).await
            }
            other => other,
        }
    }

    async fn try_resolve_google(&self, claims: &VerifiedClaims) -> Result<User, AuthError> {
        let email = claims.email.trim().to_lowercase();
        let patch = ProfilePatch {
            email: Some(email.clone()),
            name: claims.name.clone(),
            avatar_url: claims.avatar_url.clone(),
        };

        if let Some(user) = self
            .store
            .find_user_by_identity(GOOGLE_PROVIDER, &claims.subject_id)
            .await?
        {
            debug!(user_id = %user.id, "known google identity");
            return Ok(self.store.update_user_profile(user.id, &patch).await?);
        }

        let identity = NewIdentity {
            provider: GOOGLE_PROVIDER.to_string(),
            provider_user_id: claims.subject_id.clone(),
            email_at_provider: email.clone(),
            hosted_domain: claims.hosted_domain.clone(),
        };

        if let Some(user) = self.store.find_user_by_email(&email).await? {
            debug!(user_id = %user.id, "linking google identity by email");
            let patch = ProfilePatch {
                email: None,
                ..patch
            };
            return Ok(self.store.link_identity(user.id, &patch, &identity).await?);
        }

        let user = self
            .store
            .create_user(
                &NewUser {
                    email,
                    name: claims.name.clone(),
                    avatar_url: claims.avatar_url.clone(),
                },
                Some(&identity),
            )
            .await?;
        debug!(user_id = %user.id, "created user from google identity");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use anyhow::Result;

    fn claims(sub: &str, email: &str, name: Option<&str>) -> VerifiedClaims {
        VerifiedClaims {
            subject_id: sub.to_string(),
            email: email.to_string(),
            email_verified: true,
            issuer: "accounts.google.com".to_string(),
            hosted_domain: Some("university.edu".to_string()),
            name: name.map(str::to_string),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn first_sign_in_creates_user_and_identity() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone());
        let user = resolver
            .resolve_google(&claims("sub-1", "Ana@University.edu", Some("Ana")))
            .await?;
        assert_eq!(user.email, "ana@university.edu");
        let identities = store.identities_for_user(user.id).await?;
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].provider, GOOGLE_PROVIDER);
        assert_eq!(identities[0].hosted_domain.as_deref(), Some("university.edu"));
        Ok(())
    }

    #[tokio::test]
    async fn repeated_sign_in_updates_profile_without_new_identity() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone());
        let first = resolver
            .resolve_google(&claims("sub-1", "ana@university.edu", Some("Ana")))
            .await?;
        let second = resolver
            .resolve_google(&claims("sub-1", "ana@university.edu", Some("Ana Lima")))
            .await?;
        assert_eq!(first.id, second.id);
        assert_eq!(second.name.as_deref(), Some("Ana Lima"));
        assert_eq!(store.identities_for_user(first.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn absent_claim_keeps_stored_name() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone());
        resolver
            .resolve_google(&claims("sub-1", "ana@university.edu", Some("Ana")))
            .await?;
        let user = resolver
            .resolve_google(&claims("sub-1", "ana@university.edu", None))
            .await?;
        assert_eq!(user.name.as_deref(), Some("Ana"));
        Ok(())
    }

    #[tokio::test]
    async fn links_existing_account_by_email() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let existing = store
            .create_user(
                &NewUser {
                    email: "ana@university.edu".to_string(),
                    name: None,
                    avatar_url: None,
                },
                None,
            )
            .await?;
        let resolver = IdentityResolver::new(store.clone());
        let user = resolver
            .resolve_google(&claims("sub-9", "ana@university.edu", Some("Ana")))
            .await?;
        assert_eq!(user.id, existing.id);
        assert_eq!(user.name.as_deref(), Some("Ana"));
        assert_eq!(store.identities_for_user(existing.id).await?.len(), 1);
        Ok(())
    }
}
