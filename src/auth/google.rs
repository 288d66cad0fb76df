//! Google ID token verification.
//!
//! Signature, audience and expiry are checked with `jsonwebtoken` against Google's
//! published JWKS. The remaining checks (payload shape, verified email, issuer and the
//! institutional domain allow-list) live in [`validate_claims`], a pure function over
//! the decoded claims.
//!
//! JWKS caching: keep the keyset in memory with a TTL; refresh on stale cache or an
//! unknown `kid`. Every fetch attempt shares one cooldown, and a failed refresh keeps
//! the last known keyset. Health checks read the cache and the outcome of the last
//! fetch, so they never add traffic to Google beyond that cooldown.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, jwk::JwkSet};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::{Duration, Instant, SystemTime},
};
use tokio::sync::RwLock;
use tracing::{Instrument, debug, info, info_span, warn};
use url::Url;

use super::error::AuthError;

pub const GOOGLE_PROVIDER: &str = "google";
pub const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

const KEYSET_CACHE_TTL_SECONDS: u64 = 3600;
const KEYSET_REFRESH_COOLDOWN_SECONDS: u64 = 30;
const KEYSET_FETCH_TIMEOUT_SECONDS: u64 = 10;

/// Claims of a Google ID token as decoded, before policy checks.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GoogleIdClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Google has sent this both as a JSON bool and as the string `"true"`.
    #[serde(default, deserialize_with = "bool_or_string")]
    pub email_verified: bool,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub hd: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Text(String),
}

fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<BoolOrString>::deserialize(deserializer)? {
        Some(BoolOrString::Bool(value)) => value,
        Some(BoolOrString::Text(value)) => value.eq_ignore_ascii_case("true"),
        None => false,
    })
}

/// Claims that passed every check; safe to hand to the identity resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub subject_id: String,
    pub email: String,
    pub email_verified: bool,
    pub issuer: String,
    pub hosted_domain: Option<String>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Institutional email-domain allow-list. Empty means open registration.
#[derive(Clone, Debug, Default)]
pub struct DomainPolicy {
    allowed: Vec<String>,
}

impl DomainPolicy {
    #[must_use]
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed: domains
                .into_iter()
                .map(|domain| domain.as_ref().trim().to_lowercase())
                .filter(|domain| !domain.is_empty())
                .collect(),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Either the email's domain or the hosted-domain claim must be allowed.
    ///
    /// # Errors
    /// [`AuthError::DomainNotAllowed`] when neither matches a non-empty allow-list.
    pub fn check(&self, email: &str, hosted_domain: Option<&str>) -> Result<(), AuthError> {
        if self.is_open() {
            return Ok(());
        }
        let email_domain = email
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_lowercase());
        let hosted_domain = hosted_domain.map(str::to_lowercase);

        let allowed = [email_domain, hosted_domain]
            .into_iter()
            .flatten()
            .any(|domain| self.allowed.contains(&domain));
        if allowed {
            Ok(())
        } else {
            Err(AuthError::DomainNotAllowed)
        }
    }
}

/// Policy checks over decoded claims, in order: payload, verified email, issuer, domain.
///
/// # Errors
/// [`AuthError::InvalidCredential`] or [`AuthError::DomainNotAllowed`].
pub fn validate_claims(
    claims: GoogleIdClaims,
    policy: &DomainPolicy,
) -> Result<VerifiedClaims, AuthError> {
    let (Some(subject_id), Some(email)) = (claims.sub, claims.email) else {
        return Err(AuthError::InvalidCredential(
            "Invalid Google payload".to_string(),
        ));
    };
    if subject_id.is_empty() || email.is_empty() {
        return Err(AuthError::InvalidCredential(
            "Invalid Google payload".to_string(),
        ));
    }
    if !claims.email_verified {
        return Err(AuthError::InvalidCredential(
            "Google email is not verified".to_string(),
        ));
    }
    let issuer = claims
        .iss
        .filter(|iss| GOOGLE_ISSUERS.contains(&iss.as_str()))
        .ok_or_else(|| AuthError::InvalidCredential("Invalid Google issuer".to_string()))?;

    policy.check(&email, claims.hd.as_deref())?;

    Ok(VerifiedClaims {
        subject_id,
        email,
        email_verified: true,
        issuer,
        hosted_domain: claims.hd,
        name: claims.name,
        avatar_url: claims.picture,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    /// Remote keyset reachable.
    Ok,
    Error,
    /// Keyset configured locally; nothing to reach.
    Static,
}

impl DependencyStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Static => "static",
        }
    }

    #[must_use]
    pub const fn is_healthy(self) -> bool {
        !matches!(self, Self::Error)
    }
}

/// Turns an external identity token into verified claims.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<VerifiedClaims, AuthError>;

    /// Reachability of whatever the verifier depends on, for `/health`.
    async fn dependency_status(&self) -> DependencyStatus;
}

#[derive(Debug)]
enum KeysetSource {
    Static,
    Remote { url: String, client: Client },
}

#[derive(Debug, Clone)]
struct KeysetCache {
    keyset: JwkSet,
    fetched_at: Instant,
}

impl KeysetCache {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < Duration::from_secs(KEYSET_CACHE_TTL_SECONDS)
    }
}

#[derive(Debug)]
pub struct GoogleVerifier {
    keyset_source: KeysetSource,
    keyset_cache: RwLock<KeysetCache>,
    /// Accepted `aud` values.
    client_ids: Vec<String>,
    policy: DomainPolicy,
    /// Unix seconds of the last fetch attempt.
    last_refresh_unix: AtomicU64,
    last_refresh_ok: AtomicBool,
}

impl GoogleVerifier {
    /// Verifier over a fixed keyset that is never refreshed.
    #[must_use]
    pub fn with_static_keyset(
        keyset: JwkSet,
        client_ids: Vec<String>,
        policy: DomainPolicy,
    ) -> Self {
        Self {
            keyset_source: KeysetSource::Static,
            keyset_cache: RwLock::new(KeysetCache {
                keyset,
                fetched_at: Instant::now(),
            }),
            client_ids,
            policy,
            last_refresh_unix: AtomicU64::new(0),
            last_refresh_ok: AtomicBool::new(true),
        }
    }

    /// Verifier that fetches Google's JWKS from `url`.
    ///
    /// The startup fetch is best-effort: on failure the cache starts empty and stale,
    /// so verification fails closed until a refresh succeeds.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub async fn new_remote(
        url: String,
        client_ids: Vec<String>,
        policy: DomainPolicy,
    ) -> Result<Self> {
        let parsed = Url::parse(&url).context("Invalid Google JWKS URL")?;
        if parsed.scheme() != "https" {
            return Err(anyhow!("Google JWKS URL must use https: {url}"));
        }

        let client = Client::builder()
            .use_rustls_tls()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(Duration::from_secs(KEYSET_FETCH_TIMEOUT_SECONDS))
            .build()
            .context("Failed to build JWKS HTTP client")?;

        let (keyset, fetched_at, last_refresh_unix) = match fetch_keyset(&client, &url).await {
            Ok(keyset) => (keyset, Instant::now(), now_unix_seconds()),
            Err(err) => {
                warn!(
                    url = %url,
                    error = %err,
                    "google JWKS fetch failed during startup; continuing with empty keyset"
                );
                (JwkSet { keys: Vec::new() }, stale_instant(), 0)
            }
        };

        Ok(Self {
            keyset_source: KeysetSource::Remote { url, client },
            keyset_cache: RwLock::new(KeysetCache { keyset, fetched_at }),
            client_ids,
            policy,
            last_refresh_unix: AtomicU64::new(last_refresh_unix),
            last_refresh_ok: AtomicBool::new(last_refresh_unix != 0),
        })
    }

    #[must_use]
    pub fn client_ids(&self) -> &[String] {
        &self.client_ids
    }

    async fn keyset_snapshot(&self) -> JwkSet {
        let (cached, fresh) = {
            let cache = self.keyset_cache.read().await;
            (cache.keyset.clone(), cache.is_fresh())
        };

        if fresh {
            return cached;
        }

        match self.refresh_throttled().await {
            Ok(true) => self.keyset_cache.read().await.keyset.clone(),
            Ok(false) => cached,
            Err(err) => {
                warn!(error = %err, "failed to refresh google JWKS cache, keeping last known keyset");
                cached
            }
        }
    }

    async fn refresh_keyset(&self) -> Result<()> {
        let KeysetSource::Remote { url, client } = &self.keyset_source else {
            return Ok(());
        };
        let keyset = match fetch_keyset(client, url).await {
            Ok(keyset) => keyset,
            Err(err) => {
                self.last_refresh_ok.store(false, Ordering::Relaxed);
                return Err(err);
            }
        };
        let mut cache = self.keyset_cache.write().await;
        cache.keyset = keyset;
        cache.fetched_at = Instant::now();
        self.last_refresh_ok.store(true, Ordering::Relaxed);
        info!(keyset_keys = cache.keyset.keys.len(), "google JWKS cache refreshed");
        Ok(())
    }

    /// Fetch the remote keyset unless an attempt was made within the cooldown.
    /// Returns `Ok(false)` when nothing was fetched.
    async fn refresh_throttled(&self) -> Result<bool> {
        if matches!(&self.keyset_source, KeysetSource::Static) {
            return Ok(false);
        }
        let now = now_unix_seconds();
        let last = self.last_refresh_unix.load(Ordering::Relaxed);
        if now.saturating_sub(last) < KEYSET_REFRESH_COOLDOWN_SECONDS {
            return Ok(false);
        }
        self.last_refresh_unix.store(now, Ordering::Relaxed);
        self.refresh_keyset().await?;
        Ok(true)
    }

    /// Signature, audience and expiry; returns the raw claims.
    async fn decode(&self, id_token: &str) -> Result<GoogleIdClaims, AuthError> {
        let header = jsonwebtoken::decode_header(id_token).map_err(invalid_token)?;
        let kid = header
            .kid
            .ok_or_else(|| invalid_token("missing key id"))?;

        let keyset = self.keyset_snapshot().await;
        let jwk = match keyset.find(&kid) {
            Some(jwk) => jwk.clone(),
            None => {
                if let Err(err) = self.refresh_throttled().await {
                    warn!(error = %err, "google JWKS refresh on unknown kid failed");
                }
                let cache = self.keyset_cache.read().await;
                cache
                    .keyset
                    .find(&kid)
                    .cloned()
                    .ok_or_else(|| invalid_token(format!("unknown key id {kid}")))?
            }
        };

        let key = DecodingKey::from_jwk(&jwk).map_err(invalid_token)?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(self.client_ids.as_slice());

        jsonwebtoken::decode::<GoogleIdClaims>(id_token, &key, &validation)
            .map(|data| data.claims)
            .map_err(invalid_token)
    }
}

#[async_trait]
impl CredentialVerifier for GoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<VerifiedClaims, AuthError> {
        let claims = self.decode(id_token).await?;
        let verified = validate_claims(claims, &self.policy)?;
        debug!(hosted_domain = ?verified.hosted_domain, "google id token verified");
        Ok(verified)
    }

    async fn dependency_status(&self) -> DependencyStatus {
        match &self.keyset_source {
            KeysetSource::Static => DependencyStatus::Static,
            KeysetSource::Remote { .. } => {
                if self.keyset_cache.read().await.is_fresh() {
                    return DependencyStatus::Ok;
                }
                if let Err(err) = self.refresh_throttled().await {
                    warn!(error = %err, "google JWKS fetch failed during health check");
                }
                if self.last_refresh_ok.load(Ordering::Relaxed) {
                    DependencyStatus::Ok
                } else {
                    DependencyStatus::Error
                }
            }
        }
    }
}

fn invalid_token(reason: impl std::fmt::Display) -> AuthError {
    AuthError::InvalidCredential(format!("Invalid Google token: {reason}"))
}

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn stale_instant() -> Instant {
    Instant::now()
        .checked_sub(Duration::from_secs(KEYSET_CACHE_TTL_SECONDS + 1))
        .unwrap_or_else(Instant::now)
}

async fn fetch_keyset(client: &Client, url: &str) -> Result<JwkSet> {
    let span = info_span!("google.jwks.fetch", http.method = "GET", url = %url);
    async {
        let response = client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("google JWKS fetch failed: {status}"));
        }
        let keyset: JwkSet = response.json().await.context("Invalid google JWKS JSON")?;
        Ok(keyset)
    }
    .instrument(span)
    .await
}
