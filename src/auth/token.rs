//! Access tokens (HS256 JWT) and refresh-token secrets.
//!
//! The refresh token handed to clients is `<session_id>.<secret>`. Only
//! `HMAC-SHA256(pepper, secret)` is persisted; comparison is constant time.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::{config::AuthConfig, error::AuthError, models::Role};

/// Random bytes behind each refresh secret (64 base64url characters).
pub const REFRESH_SECRET_BYTES: usize = 48;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly minted refresh secret and its keyed hash.
pub struct RefreshSecret {
    pub secret: SecretString,
    pub hash: Vec<u8>,
}

impl fmt::Debug for RefreshSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshSecret")
            .field("secret", &"***")
            .field("hash", &"***")
            .finish()
    }
}

/// Parsed `<session_id>.<secret>` refresh token.
pub struct RefreshToken {
    pub session_id: Uuid,
    pub secret: SecretString,
}

impl RefreshToken {
    /// Split on the first `.`; both halves must be non-empty and the prefix a UUID.
    ///
    /// # Errors
    /// [`AuthError::MalformedToken`] when the shape is wrong.
    pub fn parse(raw: &str) -> Result<Self, AuthError> {
        let (prefix, secret) = raw.split_once('.').ok_or(AuthError::MalformedToken)?;
        if prefix.is_empty() || secret.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        let session_id = Uuid::parse_str(prefix).map_err(|_| AuthError::MalformedToken)?;
        Ok(Self {
            session_id,
            secret: SecretString::from(secret.to_string()),
        })
    }

    #[must_use]
    pub fn compose(session_id: Uuid, secret: &SecretString) -> SecretString {
        SecretString::from(format!("{session_id}.{}", secret.expose_secret()))
    }
}

impl fmt::Debug for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshToken")
            .field("session_id", &self.session_id)
            .field("secret", &"***")
            .finish()
    }
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    pepper: SecretString,
    access_ttl_seconds: i64,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.access_secret().expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            pepper: config.refresh_pepper().clone(),
            access_ttl_seconds: i64::try_from(config.access_ttl().as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// # Errors
    /// [`AuthError::Internal`] if signing fails.
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String, AuthError> {
        let iat = chrono::Utc::now().timestamp();
        let claims = AccessClaims {
            sub: user_id,
            email: email.to_string(),
            role,
            iat,
            exp: iat.saturating_add(self.access_ttl_seconds),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Internal(format!("failed to sign access token: {err}")))
    }

    /// Verify signature and expiry of an access token.
    ///
    /// # Errors
    /// [`AuthError::InvalidCredential`] for any invalid, expired, or foreign token.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidCredential("Invalid access token".to_string()))
    }

    /// # Errors
    /// [`AuthError::Internal`] when the OS RNG fails.
    pub fn issue_refresh_secret(&self) -> Result<RefreshSecret, AuthError> {
        let mut bytes = [0u8; REFRESH_SECRET_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|err| AuthError::Internal(format!("failed to generate refresh secret: {err}")))?;
        let secret = Base64UrlUnpadded::encode_string(&bytes);
        let hash = self.hash_refresh_secret(&secret)?;
        Ok(RefreshSecret {
            secret: SecretString::from(secret),
            hash,
        })
    }

    /// # Errors
    /// [`AuthError::Internal`] if the HMAC cannot be keyed.
    pub fn hash_refresh_secret(&self, secret: &str) -> Result<Vec<u8>, AuthError> {
        let mut mac = HmacSha256::new_from_slice(self.pepper.expose_secret().as_bytes())
            .map_err(|err| AuthError::Internal(format!("invalid refresh pepper: {err}")))?;
        mac.update(secret.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time check of `secret` against a stored hash.
    ///
    /// # Errors
    /// [`AuthError::Internal`] if hashing fails.
    pub fn verify_refresh_secret(&self, secret: &str, stored: &[u8]) -> Result<bool, AuthError> {
        let computed = self.hash_refresh_secret(secret)?;
        Ok(computed.ct_eq(stored).into())
    }
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_secret", &"***")
            .field("pepper", &"***")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn issuer() -> TokenIssuer {
        let config = AuthConfig::new(
            SecretString::from("s".repeat(32)),
            SecretString::from("pepper-pepper-pepper".to_string()),
        );
        TokenIssuer::new(&config)
    }

    #[test]
    fn access_token_round_trip() -> Result<(), AuthError> {
        let issuer = issuer();
        let user_id = Uuid::new_v4();
        let token = issuer.issue_access_token(user_id, "ana@university.edu", Role::Student)?;
        let claims = issuer.verify_access_token(&token)?;
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "ana@university.edu");
        assert_eq!(claims.role, Role::Student);
        assert_eq!(claims.exp - claims.iat, 900);
        Ok(())
    }

    #[test]
    fn access_token_rejects_other_secret() -> Result<(), AuthError> {
        let token = issuer().issue_access_token(Uuid::new_v4(), "a@b.edu", Role::Admin)?;
        let other = TokenIssuer::new(&AuthConfig::new(
            SecretString::from("x".repeat(32)),
            SecretString::from("p".repeat(16)),
        ));
        assert!(matches!(
            other.verify_access_token(&token),
            Err(AuthError::InvalidCredential(_))
        ));
        Ok(())
    }

    #[test]
    fn access_token_rejects_expired() {
        let config = AuthConfig::new(
            SecretString::from("s".repeat(32)),
            SecretString::from("p".repeat(16)),
        )
        .with_access_ttl(Duration::from_secs(1));
        let issuer = TokenIssuer::new(&config);
        let now = chrono::Utc::now().timestamp();
        let claims = AccessClaims {
            sub: Uuid::new_v4(),
            email: "a@b.edu".to_string(),
            role: Role::Student,
            iat: now - 120,
            exp: now - 60,
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &issuer.encoding)
            .map_err(|err| err.to_string());
        assert!(token.is_ok());
        if let Ok(token) = token {
            assert!(issuer.verify_access_token(&token).is_err());
        }
    }

    #[test]
    fn refresh_secret_has_expected_shape() -> Result<(), AuthError> {
        let issuer = issuer();
        let first = issuer.issue_refresh_secret()?;
        let second = issuer.issue_refresh_secret()?;
        assert_eq!(first.secret.expose_secret().len(), 64);
        assert_ne!(first.secret.expose_secret(), second.secret.expose_secret());
        assert_eq!(first.hash.len(), 32);
        assert!(issuer.verify_refresh_secret(first.secret.expose_secret(), &first.hash)?);
        assert!(!issuer.verify_refresh_secret(second.secret.expose_secret(), &first.hash)?);
        Ok(())
    }

    #[test]
    fn refresh_hash_depends_on_pepper() -> Result<(), AuthError> {
        let other = TokenIssuer::new(&AuthConfig::new(
            SecretString::from("s".repeat(32)),
            SecretString::from("another-pepper-value".to_string()),
        ));
        assert_ne!(
            issuer().hash_refresh_secret("secret")?,
            other.hash_refresh_secret("secret")?
        );
        Ok(())
    }

    #[test]
    fn refresh_token_parse() {
        let id = Uuid::new_v4();
        let parsed = RefreshToken::parse(&format!("{id}.abc.def"));
        assert!(matches!(
            parsed,
            Ok(RefreshToken { session_id, ref secret }) if session_id == id && secret.expose_secret() == "abc.def"
        ));

        let empty_secret = format!("{id}.");
        for raw in ["", "abc", ".secret", empty_secret.as_str(), "not-a-uuid.secret"] {
            assert!(
                matches!(RefreshToken::parse(raw), Err(AuthError::MalformedToken)),
                "{raw:?} should be malformed"
            );
        }
    }

    #[test]
    fn refresh_token_compose_round_trips() -> Result<(), AuthError> {
        let id = Uuid::new_v4();
        let composed = RefreshToken::compose(id, &SecretString::from("s3cr3t".to_string()));
        let parsed = RefreshToken::parse(composed.expose_secret())?;
        assert_eq!(parsed.session_id, id);
        assert_eq!(parsed.secret.expose_secret(), "s3cr3t");
        Ok(())
    }

    #[test]
    fn debug_hides_material() {
        let rendered = format!("{:?}", issuer());
        assert!(!rendered.contains("pepper-pepper"));
    }
}
