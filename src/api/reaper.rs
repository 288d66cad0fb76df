//! Background deletion of long-expired sessions.
//!
//! Expired sessions are already rejected on use; the reaper only bounds table growth.
//! Rows are deleted once `expires_at` is older than the retention window.

use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{Instrument, error, info, info_span};

use crate::store::AuthStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReaperConfig {
    interval: Duration,
    retention_days: u32,
}

impl ReaperConfig {
    /// Disabled by default; 7 days of retention once enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval: Duration::ZERO,
            retention_days: 7,
        }
    }

    #[must_use]
    pub fn with_interval_seconds(mut self, seconds: u64) -> Self {
        self.interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete sessions that expired before `now - retention`.
///
/// # Errors
/// Propagates store failures.
pub async fn reap_once(store: &dyn AuthStore, config: &ReaperConfig) -> anyhow::Result<u64> {
    let cutoff = Utc::now() - config.retention();
    let removed = store
        .delete_expired_sessions(cutoff)
        .instrument(info_span!("sessions.reap", %cutoff))
        .await?;
    Ok(removed)
}

/// Spawn the reaper loop, or return `None` when the interval is zero.
pub fn spawn_session_reaper(
    store: Arc<dyn AuthStore>,
    config: ReaperConfig,
) -> Option<tokio::task::JoinHandle<()>> {
    if !config.is_enabled() {
        return None;
    }
    Some(tokio::spawn(async move {
        let interval = config.interval();
        loop {
            sleep(interval).await;
            match reap_once(store.as_ref(), &config).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "expired sessions deleted"),
                Err(err) => error!("session reaper failed: {err}"),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{NewSession, NewUser};
    use crate::store::MemoryStore;
    use anyhow::Result;
    use uuid::Uuid;

    #[test]
    fn disabled_by_default() {
        let config = ReaperConfig::default();
        assert!(!config.is_enabled());
        assert!(spawn_session_reaper(Arc::new(MemoryStore::new()), config).is_none());
    }

    #[tokio::test]
    async fn reap_once_respects_retention() -> Result<()> {
        let store = MemoryStore::new();
        let user = store
            .create_user(
                &NewUser {
                    email: "ana@university.edu".to_string(),
                    name: None,
                    avatar_url: None,
                },
                None,
            )
            .await?;
        let mut ids = Vec::new();
        for age_days in [30, 3] {
            let session = store
                .create_session(&NewSession {
                    id: Uuid::new_v4(),
                    user_id: user.id,
                    refresh_token_hash: vec![0; 32],
                    user_agent: None,
                    ip: None,
                    expires_at: Utc::now() - chrono::Duration::days(age_days),
                    replaced_session_id: None,
                })
                .await?;
            ids.push(session.id);
        }

        let config = ReaperConfig::new()
            .with_interval_seconds(60)
            .with_retention_days(7);
        assert_eq!(reap_once(&store, &config).await?, 1);
        assert!(store.find_session(ids[0]).await?.is_none());
        assert!(store.find_session(ids[1]).await?.is_some());
        Ok(())
    }
}
