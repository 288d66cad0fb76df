//! Simple sign-in: email and display name, no proof of identity.
//!
//! Anyone who knows an address can obtain tokens for it, including accounts that
//! were created through Google. Keep this path behind the same gateway but never
//! feed it into decisions that assume a verified identity.

use tracing::{instrument, warn};

use super::{
    error::AuthError,
    models::{NewUser, ProfilePatch, User},
};
use crate::store::{AuthStore, StoreError};

/// Trimmed, lower-cased email used for lookups on this path.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Find the user by email, updating the name when a non-empty one is given, or create it.
///
/// # Errors
/// [`AuthError::Storage`] on store failures.
#[instrument(skip_all)]
pub async fn resolve_simple_user(
    store: &dyn AuthStore,
    email: &str,
    name: Option<&str>,
) -> Result<User, AuthError> {
    let email = normalize_email(email);
    let name = name.map(str::trim).filter(|name| !name.is_empty());

    match find_or_create(store, &email, name).await {
        Err(AuthError::Storage(StoreError::Conflict)) => {
            warn!("simple sign-in raced with a concurrent creation, retrying");
            find_or_create(store, &email, name).await
        }
        other => other,
    }
}

async fn find_or_create(
    store: &dyn AuthStore,
    email: &str,
    name: Option<&str>,
) -> Result<User, AuthError> {
    if let Some(user) = store.find_user_by_email(email).await? {
        let Some(name) = name else {
            return Ok(user);
        };
        let patch = ProfilePatch {
            name: Some(name.to_string()),
            ..ProfilePatch::default()
        };
        return Ok(store.update_user_profile(user.id, &patch).await?);
    }

    let user = store
        .create_user(
            &NewUser {
                email: email.to_string(),
                name: name.map(str::to_string),
                avatar_url: None,
            },
            None,
        )
        .await?;
    Ok(user)
}
