mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{body_json, register_user, send, send_raw, spawn_app};

#[tokio::test]
async fn register_then_login_roundtrip() {
    let app = spawn_app();

    let response = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Maria Silva",
            "email": "maria@escola.edu.br",
            "password": "senha123",
            "role": "professor",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["user"]["role"], "PROFESSOR");
    assert!(body["token"].as_str().is_some());

    let response = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "maria@escola.edu.br", "password": "senha123" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "maria@escola.edu.br");

    // The login token must work against a protected endpoint
    let token = body["token"].as_str().unwrap().to_string();
    let response = send(&app, Method::GET, "/api/auth/profile", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile = body_json(response).await;
    assert_eq!(profile["name"], "Maria Silva");
    assert_eq!(profile["stats"]["posts"], 0);
    assert_eq!(profile["stats"]["followers"], 0);
}

#[tokio::test]
async fn duplicate_email_is_rejected_without_creating_a_row() {
    let app = spawn_app();
    register_user(&app, "Primeiro", "dup@x.com", "ALUNO").await;

    let response = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Segundo",
            "email": "dup@x.com",
            "password": "outra",
            "role": "ALUNO",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Email already exists");

    let conn = app.db.get().unwrap();
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM users WHERE email = 'dup@x.com'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn register_with_missing_fields_is_rejected() {
    let app = spawn_app();
    let response = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({ "email": "semnome@x.com", "password": "senha123" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Missing required fields");
}

#[tokio::test]
async fn register_with_unknown_role_is_rejected() {
    let app = spawn_app();
    let response = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": "Alguem",
            "email": "role@x.com",
            "password": "senha123",
            "role": "SUPERUSER",
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = spawn_app();
    register_user(&app, "Alvo", "alvo@x.com", "ALUNO").await;

    let unknown = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "naoexiste@x.com", "password": "qualquer" })),
    )
    .await;
    let wrong = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "email": "alvo@x.com", "password": "errada" })),
    )
    .await;

    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    // Same body for both, so emails cannot be enumerated
    let unknown_body = body_json(unknown).await;
    let wrong_body = body_json(wrong).await;
    assert_eq!(unknown_body, wrong_body);
    assert_eq!(unknown_body["error"], "Invalid credentials");
}

#[tokio::test]
async fn profile_requires_a_valid_token() {
    let app = spawn_app();

    let response = send(&app, Method::GET, "/api/auth/profile", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "No token provided");

    let response = send(
        &app,
        Method::GET,
        "/api/auth/profile",
        Some("not-a-real-token"),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn malformed_json_body_gets_the_standard_error_shape() {
    let app = spawn_app();

    let response = send_raw(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        "application/json",
        b"{not json".to_vec(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Parse failures must come back as {"error": msg} like every other 400
    let body = body_json(response).await;
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn health_endpoint_is_public() {
    let app = spawn_app();
    let response = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "OK");
}
