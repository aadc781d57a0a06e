//! Integration tests for the token rotation server

use std::net::TcpListener;
use std::sync::Arc;
use token_rotation::auth::{StaticCredentials, TokenIssuer, TokenService};
use token_rotation::configuration::{JwtSettings, RotationPolicy};
use token_rotation::startup::{run, AppState};
use token_rotation::store::InMemoryRefreshTokenStore;

fn spawn_app() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let issuer = TokenIssuer::new(JwtSettings {
        secret: "test-secret-key-at-least-32-characters-long".to_string(),
        access_token_expiry: 900,
        refresh_token_expiry: 604800,
        issuer: "test".to_string(),
        rotation_policy: RotationPolicy::SingleSession,
    })
    .expect("Failed to build issuer");
    let tokens = TokenService::new(Arc::new(issuer), Arc::new(InMemoryRefreshTokenStore::new()));
    let state = AppState::new(tokens, Arc::new(StaticCredentials::new()));

    let server = run(listener, state)
        .expect("Failed to create server");

    let _ = tokio::spawn(async move {
        let _ = server.await;
    });

    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn health_check_works() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/health_check", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let addr = spawn_app();

    let response = reqwest::Client::new()
        .get(&format!("{}/auth/unknown", addr))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(404, response.status().as_u16());
}
