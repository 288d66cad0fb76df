use clap::{Arg, ArgMatches, Command};

use crate::auth::config::{DEFAULT_GOOGLE_JWKS_URL, split_list};

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_IDS: &str = "google-client-ids";
pub const ARG_GOOGLE_ALLOWED_DOMAINS: &str = "google-allowed-domains";
pub const ARG_GOOGLE_JWKS_URL: &str = "google-jwks-url";

#[derive(Debug, Clone)]
pub struct Options {
    pub client_ids: Vec<String>,
    pub allowed_domains: Vec<String>,
    pub jwks_url: String,
}

impl Options {
    /// Parse Google sign-in arguments from matches.
    ///
    /// `--google-client-id` and `--google-client-ids` are merged; duplicates are dropped.
    ///
    /// # Errors
    /// Returns an error if no client id is configured.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let mut client_ids: Vec<String> = Vec::new();
        let single = matches
            .get_one::<String>(ARG_GOOGLE_CLIENT_ID)
            .map(|v| split_list(v))
            .unwrap_or_default();
        let many = matches
            .get_one::<String>(ARG_GOOGLE_CLIENT_IDS)
            .map(|v| split_list(v))
            .unwrap_or_default();
        for id in single.into_iter().chain(many) {
            if !client_ids.contains(&id) {
                client_ids.push(id);
            }
        }

        if client_ids.is_empty() {
            anyhow::bail!(
                "missing required argument: --{ARG_GOOGLE_CLIENT_ID} or --{ARG_GOOGLE_CLIENT_IDS}"
            );
        }

        Ok(Self {
            client_ids,
            allowed_domains: matches
                .get_one::<String>(ARG_GOOGLE_ALLOWED_DOMAINS)
                .map(|v| split_list(v))
                .unwrap_or_default(),
            jwks_url: matches
                .get_one::<String>(ARG_GOOGLE_JWKS_URL)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GOOGLE_JWKS_URL.to_string()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id accepted as ID token audience")
                .env("GOOGLE_CLIENT_ID"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_IDS)
                .long(ARG_GOOGLE_CLIENT_IDS)
                .help("Comma separated list of additional Google OAuth client ids")
                .long_help(
                    "Comma separated list of Google OAuth client ids (web, iOS, Android).\n\nMerged with --google-client-id; an ID token is accepted when its `aud` matches any of them.",
                )
                .env("GOOGLE_CLIENT_IDS"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_ALLOWED_DOMAINS)
                .long(ARG_GOOGLE_ALLOWED_DOMAINS)
                .help("Comma separated institutional email domains (empty allows any domain)")
                .env("GOOGLE_ALLOWED_DOMAINS"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_JWKS_URL)
                .long(ARG_GOOGLE_JWKS_URL)
                .help("Google signing keys (JWKS) URL")
                .long_help(
                    "Google signing keys (JWKS) URL.\n\nThe keyset is cached (TTL 1 hour) and refreshed on unknown `kid` with a cooldown.",
                )
                .env("GOOGLE_JWKS_URL")
                .default_value(DEFAULT_GOOGLE_JWKS_URL),
        )
}
