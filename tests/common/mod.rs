#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use educonnect::config::Config;
use educonnect::state::{AppState, DbPool};
use educonnect::{db, routes};

pub const JWT_SECRET: &str = "test-secret";

/// A fully wired router backed by a throwaway database. Keeps the temp dir
/// alive so the sqlite file survives for the duration of the test.
pub struct TestApp {
    pub router: Router,
    pub db: DbPool,
    _data_dir: TempDir,
}

pub fn spawn_app() -> TestApp {
    let data_dir = TempDir::new().expect("Failed to create temp dir");
    let uploads = data_dir.path().join("uploads");
    std::fs::create_dir_all(&uploads).expect("Failed to create uploads dir");

    let mut config = Config::default();
    config.auth.jwt_secret = JWT_SECRET.to_string();
    config.database.path = Some(data_dir.path().join("test.db"));
    config.storage.path = Some(uploads);

    let pool = db::create_pool(config.db_path()).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let state = AppState {
        db: pool.clone(),
        config,
    };

    TestApp {
        router: routes::api_router().with_state(state),
        db: pool,
        _data_dir: data_dir,
    }
}

pub async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("Failed to build request");

    app.router
        .clone()
        .oneshot(request)
        .await
        .expect("Request failed")
}

/// Sends the body verbatim with an arbitrary content type. For requests the
/// JSON helpers cannot express, like malformed payloads or multipart forms.
pub async fn send_raw(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    content_type: &str,
    body: Vec<u8>,
) -> Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = builder.body(Body::from(body)).expect("Failed to build request");

    app.router
        .clone()
        .oneshot(request)
        .await
        .expect("Request failed")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body was not valid JSON")
}

pub async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("Body was not valid UTF-8")
}

/// Registers a user through the public endpoint and returns (token, user id).
pub async fn register_user(app: &TestApp, name: &str, email: &str, role: &str) -> (String, String) {
    let response = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(serde_json::json!({
            "name": name,
            "email": email,
            "password": "senha123",
            "role": role,
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let token = body["token"].as_str().expect("No token in response");
    let id = body["user"]["id"].as_str().expect("No user id in response");
    (token.to_string(), id.to_string())
}

/// Creates a post as the given user and returns its id.
pub async fn create_post(app: &TestApp, token: &str, content: &str) -> String {
    let response = send(
        app,
        Method::POST,
        "/api/posts",
        Some(token),
        Some(serde_json::json!({ "content": content })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    body["id"].as_str().expect("No post id").to_string()
}
