//! # UniConnect (accounts, sign-in and sessions)
//!
//! `uniconnect` is the backend authority for the UniConnect university network. It
//! signs students in with Google (or the low-trust simple flow), issues short-lived
//! access tokens, and manages long-lived refresh tokens with rotate-on-use.
//!
//! ## Refresh tokens
//!
//! A refresh token is `<session_id>.<secret>`. The session id is the public half and
//! names one row in `sessions`; only an HMAC of the secret (keyed with a server-side
//! pepper) is stored. Every successful refresh revokes the presented session and
//! creates a new one, so each token is valid for exactly one use.
//!
//! - **Reuse detection:** presenting a wrong secret for a live session revokes that
//!   session before the request fails.
//! - **Replay of a rotated token:** fails as an invalid session, because revocation
//!   and expiry are checked before the hash.
//!
//! ## Sign-in paths
//!
//! Google sign-in verifies the ID token signature, issuer, email verification and the
//! optional institutional domain allow-list. The simple path lives in
//! [`auth::low_trust`] and performs no proof of identity.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
