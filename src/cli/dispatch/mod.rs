//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to an [`Action`], building the auth and reaper
//! configuration on the way so invalid secrets fail before the server starts.

use crate::api::ReaperConfig;
use crate::auth::AuthConfig;
use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth, google};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or the auth configuration is invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let google_opts = google::Options::parse(matches)?;

    let auth_config = AuthConfig::new(auth_opts.access_secret, auth_opts.refresh_pepper)
        .with_access_ttl(auth_opts.access_ttl)
        .with_refresh_ttl_days(auth_opts.refresh_ttl_days)
        .with_google_client_ids(google_opts.client_ids)
        .with_allowed_domains(google_opts.allowed_domains)
        .with_google_jwks_url(google_opts.jwks_url)
        .with_frontend_base_url(auth_opts.frontend_base_url)
        .validate()
        .context("invalid auth configuration")?;

    let reaper_config = ReaperConfig::new()
        .with_interval_seconds(auth_opts.reaper.interval_seconds)
        .with_retention_days(auth_opts.reaper.retention_days);

    Ok(Action::Server(Args {
        port,
        dsn,
        auth: auth_config,
        reaper: reaper_config,
    }))
}
