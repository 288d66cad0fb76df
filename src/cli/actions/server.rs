use crate::{
    api::{self, ReaperConfig},
    auth::AuthConfig,
    cli::telemetry,
};
use anyhow::Result;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub auth: AuthConfig,
    pub reaper: ReaperConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the Google keyset URL is invalid,
/// or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        port = args.port,
        access_ttl_seconds = args.auth.access_ttl().as_secs(),
        refresh_ttl_days = args.auth.refresh_ttl_days(),
        client_ids = args.auth.google_client_ids().len(),
        allowed_domains = ?args.auth.allowed_domains(),
        "starting server"
    );

    let result = api::new(args.port, args.dsn, args.auth, args.reaper).await;

    telemetry::shutdown_tracer();

    result
}
