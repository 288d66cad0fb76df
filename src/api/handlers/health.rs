use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::{GIT_COMMIT_HASH, auth::AuthService};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
    google_keyset: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DatabaseHealth {
    database: String,
    timestamp: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Database and Google keyset are healthy", body = [Health]),
        (status = 503, description = "Database or Google keyset is unhealthy", body = [Health])
    ),
    tag= "health"
)]
// axum handler for health
pub async fn health(method: Method, auth: Extension<Arc<AuthService>>) -> impl IntoResponse {
    let database = auth.store().ping().await;
    if let Err(err) = &database {
        error!("Failed to ping database: {}", err);
    }

    let keyset_status = auth.verifier().dependency_status().await;
    let is_healthy = database.is_ok() && keyset_status.is_healthy();

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database.is_ok() {
            "ok".to_string()
        } else {
            "error".to_string()
        },
        google_keyset: keyset_status.as_str().to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = if health.commit.len() > 7 {
        &health.commit[0..7]
    } else {
        ""
    };

    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app_header_value| {
            debug!("X-App header: {:?}", x_app_header_value);

            let mut headers = HeaderMap::new();

            headers.insert("X-App", x_app_header_value);

            headers
        })
        .map_err(|err| {
            error!("Failed to parse X-App header: {}", err);
        });

    let headers = headers.unwrap_or_else(|()| HeaderMap::new());

    debug!(
        database = %health.database,
        google_keyset = %health.google_keyset,
        "health computed"
    );

    if is_healthy {
        (StatusCode::OK, headers, body)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}

#[utoipa::path(
    get,
    path = "/health/db",
    responses(
        (status = 200, description = "Database reachable", body = DatabaseHealth),
        (status = 503, description = "Database unreachable", body = DatabaseHealth)
    ),
    tag = "health"
)]
pub async fn database(auth: Extension<Arc<AuthService>>) -> impl IntoResponse {
    let (status, database) = match auth.store().ping().await {
        Ok(()) => (StatusCode::OK, "up"),
        Err(err) => {
            error!("Database health check failed: {}", err);
            (StatusCode::SERVICE_UNAVAILABLE, "down")
        }
    };
    (
        status,
        Json(DatabaseHealth {
            database: database.to_string(),
            timestamp: Utc::now(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_serializes_camel_case() -> anyhow::Result<()> {
        let health = Health {
            commit: "abc".to_string(),
            name: "uniconnect".to_string(),
            version: "0.1.0".to_string(),
            database: "ok".to_string(),
            google_keyset: "static".to_string(),
        };
        let value = serde_json::to_value(&health)?;
        assert_eq!(value.get("googleKeyset").and_then(|v| v.as_str()), Some("static"));
        Ok(())
    }
}
