//! Auth configuration: secrets, token lifetimes, Google client ids and the
//! institutional domain allow-list.

use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use thiserror::Error;

pub const MIN_ACCESS_SECRET_LEN: usize = 32;
pub const MIN_REFRESH_PEPPER_LEN: usize = 16;
pub const DEFAULT_ACCESS_TOKEN_TTL: &str = "15m";
pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: u32 = 30;
pub const MAX_REFRESH_TOKEN_TTL_DAYS: u32 = 36_500;
pub const DEFAULT_GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";
pub const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:8081";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("access token secret must be at least {MIN_ACCESS_SECRET_LEN} characters")]
    AccessSecretTooShort,
    #[error("refresh token pepper must be at least {MIN_REFRESH_PEPPER_LEN} characters")]
    PepperTooShort,
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("refresh token TTL must be between 1 and {MAX_REFRESH_TOKEN_TTL_DAYS} days")]
    InvalidRefreshTtl,
    #[error("at least one Google client id is required")]
    MissingClientId,
}

/// Parse a token lifetime such as `15m`, `900s`, `12h`, `7d` or plain seconds (`900`).
///
/// # Errors
/// Returns [`ConfigError::InvalidDuration`] for empty, zero, or unknown-unit input.
pub fn parse_ttl(value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    let invalid = || ConfigError::InvalidDuration(value.to_string());

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (amount, unit) = trimmed.split_at(split);
    let amount: u64 = amount.parse().map_err(|_| invalid())?;

    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };

    match amount.checked_mul(multiplier) {
        Some(0) | None => Err(invalid()),
        Some(seconds) => Ok(Duration::from_secs(seconds)),
    }
}

/// Split a comma separated flag value, trimming and dropping empty entries.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Clone)]
pub struct AuthConfig {
    access_secret: SecretString,
    access_ttl: Duration,
    refresh_pepper: SecretString,
    refresh_ttl_days: u32,
    google_client_ids: Vec<String>,
    allowed_domains: Vec<String>,
    google_jwks_url: String,
    frontend_base_url: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(access_secret: SecretString, refresh_pepper: SecretString) -> Self {
        Self {
            access_secret,
            access_ttl: Duration::from_secs(15 * 60),
            refresh_pepper,
            refresh_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            google_client_ids: Vec::new(),
            allowed_domains: Vec::new(),
            google_jwks_url: DEFAULT_GOOGLE_JWKS_URL.to_string(),
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_days(mut self, days: u32) -> Self {
        self.refresh_ttl_days = days;
        self
    }

    /// Client ids accepted as the ID token audience. Blank entries are ignored.
    #[must_use]
    pub fn with_google_client_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.google_client_ids = ids
            .into_iter()
            .map(Into::into)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        self
    }

    /// Institutional domains; stored lower-cased. Empty means open registration.
    #[must_use]
    pub fn with_allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_domains = domains
            .into_iter()
            .map(Into::into)
            .map(|domain| domain.trim().to_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();
        self
    }

    #[must_use]
    pub fn with_google_jwks_url(mut self, url: String) -> Self {
        self.google_jwks_url = url;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    /// Enforce minimum secret lengths, a bounded refresh TTL and at least one client id.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.access_secret.expose_secret().chars().count() < MIN_ACCESS_SECRET_LEN {
            return Err(ConfigError::AccessSecretTooShort);
        }
        if self.refresh_pepper.expose_secret().chars().count() < MIN_REFRESH_PEPPER_LEN {
            return Err(ConfigError::PepperTooShort);
        }
        if self.access_ttl.is_zero() {
            return Err(ConfigError::InvalidDuration("0".to_string()));
        }
        if !(1..=MAX_REFRESH_TOKEN_TTL_DAYS).contains(&self.refresh_ttl_days) {
            return Err(ConfigError::InvalidRefreshTtl);
        }
        if self.google_client_ids.is_empty() {
            return Err(ConfigError::MissingClientId);
        }
        Ok(self)
    }

    pub(crate) fn access_secret(&self) -> &SecretString {
        &self.access_secret
    }

    pub(crate) fn refresh_pepper(&self) -> &SecretString {
        &self.refresh_pepper
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl_days(&self) -> u32 {
        self.refresh_ttl_days
    }

    #[must_use]
    pub fn google_client_ids(&self) -> &[String] {
        &self.google_client_ids
    }

    #[must_use]
    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    #[must_use]
    pub fn google_jwks_url(&self) -> &str {
        &self.google_jwks_url
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_secret", &"***")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_pepper", &"***")
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("google_client_ids", &self.google_client_ids)
            .field("allowed_domains", &self.allowed_domains)
            .field("google_jwks_url", &self.google_jwks_url)
            .field("frontend_base_url", &self.frontend_base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AuthConfig {
        AuthConfig::new(
            SecretString::from("a".repeat(32)),
            SecretString::from("p".repeat(16)),
        )
        .with_google_client_ids(["client-1.apps.googleusercontent.com"])
    }

    #[test]
    fn parse_ttl_accepts_units() {
        assert_eq!(parse_ttl("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_ttl("900"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_ttl("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_ttl("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_ttl("1d"), Ok(Duration::from_secs(86_400)));
    }

    #[test]
    fn parse_ttl_rejects_garbage() {
        for value in ["", "m", "0m", "15w", "-5m", "1.5h"] {
            assert!(parse_ttl(value).is_err(), "{value} should be rejected");
        }
    }

    #[test]
    fn split_list_drops_blanks() {
        assert_eq!(
            split_list(" a.edu, ,b.edu,"),
            vec!["a.edu".to_string(), "b.edu".to_string()]
        );
        assert!(split_list("").is_empty());
    }

    #[test]
    fn defaults_and_overrides() {
        let config = base();
        assert_eq!(config.access_ttl(), Duration::from_secs(900));
        assert_eq!(config.refresh_ttl_days(), DEFAULT_REFRESH_TOKEN_TTL_DAYS);
        assert_eq!(config.google_jwks_url(), DEFAULT_GOOGLE_JWKS_URL);
        assert!(config.allowed_domains().is_empty());

        let config = config
            .with_access_ttl(Duration::from_secs(60))
            .with_refresh_ttl_days(7)
            .with_allowed_domains([" University.EDU ", ""]);
        assert_eq!(config.access_ttl(), Duration::from_secs(60));
        assert_eq!(config.refresh_ttl_days(), 7);
        assert_eq!(config.allowed_domains(), ["university.edu".to_string()]);
    }

    #[test]
    fn validate_enforces_secret_lengths() {
        assert!(base().validate().is_ok());

        let short_secret = AuthConfig::new(
            SecretString::from("short".to_string()),
            SecretString::from("p".repeat(16)),
        )
        .with_google_client_ids(["id"]);
        assert_eq!(
            short_secret.validate().err(),
            Some(ConfigError::AccessSecretTooShort)
        );

        let short_pepper = AuthConfig::new(
            SecretString::from("a".repeat(32)),
            SecretString::from("p".repeat(15)),
        )
        .with_google_client_ids(["id"]);
        assert_eq!(
            short_pepper.validate().err(),
            Some(ConfigError::PepperTooShort)
        );
    }

    #[test]
    fn validate_requires_client_id_and_bounded_ttl() {
        let no_client = AuthConfig::new(
            SecretString::from("a".repeat(32)),
            SecretString::from("p".repeat(16)),
        );
        assert_eq!(no_client.validate().err(), Some(ConfigError::MissingClientId));
        assert_eq!(
            base().with_refresh_ttl_days(0).validate().err(),
            Some(ConfigError::InvalidRefreshTtl)
        );
        assert_eq!(
            base().with_refresh_ttl_days(200_000_000).validate().err(),
            Some(ConfigError::InvalidRefreshTtl)
        );
        assert!(
            base()
                .with_refresh_ttl_days(MAX_REFRESH_TOKEN_TTL_DAYS)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", base());
        assert!(!rendered.contains(&"a".repeat(32)));
        assert!(rendered.contains("***"));
    }
}
