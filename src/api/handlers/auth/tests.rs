//! HTTP tests for the auth endpoints, driven through the full router.

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Request, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE},
    response::Response,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use crate::api::app;
use crate::auth::gateway::tests::test_service;
use crate::store::MemoryStore;

fn test_app() -> Router {
    let service = test_service(Arc::new(MemoryStore::new()));
    app(
        Arc::new(service),
        HeaderValue::from_static("http://localhost:8081"),
    )
}

async fn post(app: &Router, uri: &str, body: &Value) -> Result<Response> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header("user-agent", "uniconnect-tests")
        .body(Body::from(body.to_string()))?;
    Ok(app.clone().oneshot(request).await?)
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    value
        .get(name)
        .and_then(Value::as_str)
        .with_context(|| format!("missing {name}"))
}

async fn simple_sign_in(app: &Router) -> Result<Value> {
    let response = post(
        app,
        "/v1/auth/simple",
        &json!({ "email": "Bo@Uni.edu", "name": "Bo" }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

#[tokio::test]
async fn google_sign_in_returns_token_pair() -> Result<()> {
    let app = test_app();
    let response = post(
        &app,
        "/v1/auth/google",
        &json!({ "idToken": "sub-1|ana@university.edu|Ana" }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await?;
    assert!(!field(&body, "accessToken")?.is_empty());
    assert!(field(&body, "refreshToken")?.contains('.'));
    let user = body.get("user").context("missing user")?;
    assert_eq!(field(user, "email")?, "ana@university.edu");
    assert_eq!(field(user, "name")?, "Ana");
    assert_eq!(field(user, "role")?, "student");
    Ok(())
}

#[tokio::test]
async fn google_sign_in_validates_body() -> Result<()> {
    let app = test_app();
    let response = post(&app, "/v1/auth/google", &json!({ "idToken": "  " })).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await?;
    assert_eq!(field(&body, "message")?, "Invalid body");
    let errors = body
        .get("errors")
        .and_then(Value::as_array)
        .context("missing errors")?;
    assert_eq!(field(&errors[0], "field")?, "idToken");
    Ok(())
}

#[tokio::test]
async fn non_json_body_is_invalid() -> Result<()> {
    let app = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/auth/refresh")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(field(&json_body(response).await?, "message")?, "Invalid body");
    Ok(())
}

#[tokio::test]
async fn google_sign_in_rejections() -> Result<()> {
    let app = test_app();
    let response = post(
        &app,
        "/v1/auth/google",
        &json!({ "idToken": "sub-2|a@other.com" }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        field(&json_body(response).await?, "message")?,
        "Institutional domain is not allowed"
    );

    let response = post(
        &app,
        "/v1/auth/google",
        &json!({ "idToken": "unverified|ana@university.edu" }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        field(&json_body(response).await?, "message")?,
        "Google email is not verified"
    );
    Ok(())
}

#[tokio::test]
async fn simple_sign_in_rejects_invalid_email() -> Result<()> {
    let app = test_app();
    let response = post(&app, "/v1/auth/simple", &json!({ "email": "nope" })).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post(&app, "/v1/auth/simple", &json!({ "name": "Bo" })).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

fn error_fields(body: &Value) -> Vec<&str> {
    body.get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|error| error.get("field").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn simple_sign_in_requires_name() -> Result<()> {
    let app = test_app();
    let response = post(&app, "/v1/auth/simple", &json!({ "email": "x@uni.edu" })).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await?;
    assert_eq!(field(&body, "message")?, "Invalid body");
    assert_eq!(error_fields(&body), vec!["name"]);

    let response = post(
        &app,
        "/v1/auth/simple",
        &json!({ "email": "y@uni.edu", "name": "   " }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_fields(&json_body(response).await?), vec!["name"]);

    let response = post(&app, "/v1/auth/simple", &json!({ "email": "nope" })).await?;
    assert_eq!(error_fields(&json_body(response).await?), vec!["email", "name"]);
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_rejects_replay() -> Result<()> {
    let app = test_app();
    let signed_in = simple_sign_in(&app).await?;
    let original = field(&signed_in, "refreshToken")?.to_string();

    let response = post(&app, "/v1/auth/refresh", &json!({ "refreshToken": original })).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = json_body(response).await?;
    assert_ne!(field(&rotated, "refreshToken")?, original);
    assert_eq!(
        field(rotated.get("user").context("missing user")?, "email")?,
        "bo@uni.edu"
    );

    let replay = post(&app, "/v1/auth/refresh", &json!({ "refreshToken": original })).await?;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        field(&json_body(replay).await?, "message")?,
        "Refresh session is invalid or expired"
    );
    Ok(())
}

#[tokio::test]
async fn refresh_with_malformed_token() -> Result<()> {
    let app = test_app();
    let response = post(&app, "/v1/auth/refresh", &json!({ "refreshToken": "garbage" })).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        field(&json_body(response).await?, "message")?,
        "Invalid refresh token format"
    );
    Ok(())
}

#[tokio::test]
async fn logout_is_idempotent() -> Result<()> {
    let app = test_app();
    let signed_in = simple_sign_in(&app).await?;
    let token = field(&signed_in, "refreshToken")?.to_string();

    for _ in 0..2 {
        let response = post(&app, "/v1/auth/logout", &json!({ "refreshToken": token })).await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    let response = post(&app, "/v1/auth/refresh", &json!({ "refreshToken": token })).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_with_empty_prefix_is_bad_request() -> Result<()> {
    let app = test_app();
    let response = post(&app, "/v1/auth/logout", &json!({ "refreshToken": ".secret" })).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn me_requires_bearer_token() -> Result<()> {
    let app = test_app();
    let signed_in = simple_sign_in(&app).await?;
    let access = field(&signed_in, "accessToken")?;

    let request = Request::builder()
        .uri("/v1/me")
        .header(AUTHORIZATION, format!("Bearer {access}"))
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(field(&json_body(response).await?, "email")?, "bo@uni.edu");

    let request = Request::builder().uri("/v1/me").body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .uri("/v1/me")
        .header(AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        field(&json_body(response).await?, "message")?,
        "Invalid or expired token"
    );
    Ok(())
}

#[tokio::test]
async fn health_reports_dependencies() -> Result<()> {
    let app = test_app();
    let request = Request::builder().uri("/health").body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-App"));
    let body = json_body(response).await?;
    assert_eq!(field(&body, "database")?, "ok");
    assert_eq!(field(&body, "googleKeyset")?, "static");

    let request = Request::builder().uri("/health/db").body(Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(field(&json_body(response).await?, "database")?, "up");
    Ok(())
}
