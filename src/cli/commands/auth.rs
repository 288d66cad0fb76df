use clap::{Arg, ArgMatches, Command, builder::ValueParser};
use secrecy::SecretString;
use std::time::Duration;

use crate::auth::config::{
    DEFAULT_ACCESS_TOKEN_TTL, DEFAULT_FRONTEND_BASE_URL, DEFAULT_REFRESH_TOKEN_TTL_DAYS,
    MAX_REFRESH_TOKEN_TTL_DAYS, parse_ttl,
};

pub const ARG_JWT_ACCESS_SECRET: &str = "jwt-access-secret";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl";
pub const ARG_REFRESH_TOKEN_PEPPER: &str = "refresh-token-pepper";
pub const ARG_REFRESH_TOKEN_TTL_DAYS: &str = "refresh-token-ttl-days";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_REAPER_INTERVAL_SECONDS: &str = "session-reaper-interval-seconds";
pub const ARG_SESSION_RETENTION_DAYS: &str = "session-retention-days";

#[derive(Debug)]
pub struct Options {
    pub access_secret: SecretString,
    pub access_ttl: Duration,
    pub refresh_pepper: SecretString,
    pub refresh_ttl_days: u32,
    pub frontend_base_url: String,
    pub reaper: ReaperOptions,
}

#[derive(Debug, Clone, Copy)]
pub struct ReaperOptions {
    pub interval_seconds: u64,
    pub retention_days: u32,
}

impl Options {
    /// Parse token, session and CORS arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_secret = |id: &str| -> anyhow::Result<SecretString> {
            matches
                .get_one::<String>(id)
                .filter(|v| !v.trim().is_empty())
                .map(|v| SecretString::from(v.clone()))
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let access_ttl = match matches.get_one::<Duration>(ARG_ACCESS_TOKEN_TTL) {
            Some(ttl) => *ttl,
            None => parse_ttl(DEFAULT_ACCESS_TOKEN_TTL)?,
        };

        Ok(Self {
            access_secret: read_secret(ARG_JWT_ACCESS_SECRET)?,
            access_ttl,
            refresh_pepper: read_secret(ARG_REFRESH_TOKEN_PEPPER)?,
            refresh_ttl_days: matches
                .get_one::<u32>(ARG_REFRESH_TOKEN_TTL_DAYS)
                .copied()
                .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| DEFAULT_FRONTEND_BASE_URL.to_string()),
            reaper: ReaperOptions {
                interval_seconds: matches
                    .get_one::<u64>(ARG_SESSION_REAPER_INTERVAL_SECONDS)
                    .copied()
                    .unwrap_or(0),
                retention_days: matches
                    .get_one::<u32>(ARG_SESSION_RETENTION_DAYS)
                    .copied()
                    .unwrap_or(7),
            },
        })
    }
}

#[must_use]
pub fn validator_ttl() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<Duration, String> {
        parse_ttl(value).map_err(|e| e.to_string())
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_session_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_ACCESS_SECRET)
                .long(ARG_JWT_ACCESS_SECRET)
                .help("HMAC secret used to sign access tokens (at least 32 characters)")
                .env("JWT_ACCESS_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token lifetime, e.g. 15m, 900s, 1h")
                .env("ACCESS_TOKEN_TTL")
                .default_value(DEFAULT_ACCESS_TOKEN_TTL)
                .value_parser(validator_ttl()),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_PEPPER)
                .long(ARG_REFRESH_TOKEN_PEPPER)
                .help("Server-side pepper for refresh token hashes (at least 16 characters)")
                .env("REFRESH_TOKEN_PEPPER")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_DAYS)
                .long(ARG_REFRESH_TOKEN_TTL_DAYS)
                .help("Refresh token lifetime in days")
                .env("REFRESH_TOKEN_TTL_DAYS")
                .default_value("30")
                .value_parser(
                    clap::value_parser!(u32).range(1..=i64::from(MAX_REFRESH_TOKEN_TTL_DAYS)),
                ),
        )
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used as the allowed CORS origin")
                .env("UNICONNECT_FRONTEND_BASE_URL")
                .default_value(DEFAULT_FRONTEND_BASE_URL),
        )
        .arg(
            Arg::new(ARG_SESSION_REAPER_INTERVAL_SECONDS)
                .long(ARG_SESSION_REAPER_INTERVAL_SECONDS)
                .help("Interval between expired session cleanups in seconds (0 disables)")
                .env("UNICONNECT_SESSION_REAPER_INTERVAL_SECONDS")
                .default_value("0")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_SESSION_RETENTION_DAYS)
                .long(ARG_SESSION_RETENTION_DAYS)
                .help("Days to keep expired sessions before the reaper deletes them")
                .env("UNICONNECT_SESSION_RETENTION_DAYS")
                .default_value("7")
                .value_parser(clap::value_parser!(u32)),
        )
}
