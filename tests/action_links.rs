mod common;

use axum::{body::to_bytes, http::StatusCode};
use std::sync::Arc;

use booking_backend::{
    AppState,
    admission::AdmissionController,
    token::{ActionTokenService, TokenError},
    utils::error_codes,
};
use serde_json::json;
use tower::ServiceExt;

use common::{TOKEN_SECRET, app, post_json, presets};

async fn cancel_with(token: &str, client: &str) -> (StatusCode, Vec<u8>) {
    let (app, _) = app(presets(50, 50, 50));
    let response = app
        .oneshot(post_json(
            "/api/bookings/manage/cancel",
            client,
            json!({ "token": token }),
        ))
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

#[tokio::test]
async fn failure_reasons_are_indistinguishable() {
    let issuer = ActionTokenService::new(TOKEN_SECRET).unwrap();

    let expired = issuer
        .issue_with_ttl(12, "ada@example.com", chrono::Duration::seconds(-5))
        .unwrap();

    let valid = issuer.issue(12, "ada@example.com").unwrap();
    let (payload, signature) = valid.split_once('.').unwrap();
    let flipped = if signature.starts_with('A') { 'B' } else { 'A' };
    let tampered = format!("{payload}.{flipped}{}", &signature[1..]);

    let foreign = ActionTokenService::new("some-other-secret")
        .unwrap()
        .issue(12, "ada@example.com")
        .unwrap();

    let responses = [
        cancel_with(&expired, "10.0.0.1").await,
        cancel_with(&tampered, "10.0.0.2").await,
        cancel_with(&foreign, "10.0.0.3").await,
        cancel_with("one.two.three", "10.0.0.4").await,
        cancel_with("", "10.0.0.5").await,
    ];

    for (status, body) in &responses {
        assert_eq!(*status, StatusCode::BAD_REQUEST);
        assert_eq!(body, &responses[0].1);
    }
    let body: serde_json::Value = serde_json::from_slice(&responses[0].1).unwrap();
    assert_eq!(body["code"], error_codes::INVALID_ACTION_LINK);
    assert_eq!(body["msg"], "This link is invalid or has expired");
}

#[tokio::test]
async fn manage_link_uses_public_base_url() {
    let (_, state) = app(presets(5, 20, 100));
    let token = state.tokens.issue(3, "ada@example.com").unwrap();

    let url = state.manage_url(&token);

    assert_eq!(url, format!("https://booking.test/manage?token={token}"));
    assert_eq!(state.tokens.verify(&token).unwrap().subject_id, 3);
}

#[tokio::test]
async fn blank_token_secret_refuses_to_build_state() {
    let mut config = common::test_config(presets(5, 20, 100));
    config.action_token_secret = "  ".into();
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect_lazy(&config.database_url)
        .unwrap();

    let result = AppState::new(pool, config, Arc::new(AdmissionController::in_memory()));

    assert_eq!(result.err(), Some(TokenError::MissingSecret));
}
