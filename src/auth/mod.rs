//! Authentication core: credential verification, identity resolution, token issuing
//! and refresh-token sessions.

pub mod config;
pub mod error;
pub mod gateway;
pub mod google;
pub mod low_trust;
pub mod models;
pub mod resolver;
pub mod sessions;
pub mod token;

pub use config::{AuthConfig, ConfigError};
pub use error::AuthError;
pub use gateway::{AuthGrant, AuthService};
pub use google::{CredentialVerifier, DependencyStatus, DomainPolicy, GoogleVerifier};
pub use models::{DeviceContext, Role, User};
pub use token::AccessClaims;
