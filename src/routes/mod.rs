pub mod admin;
pub mod auth;
pub mod moderation;
pub mod posts;
pub mod projects;
pub mod settings;
pub mod social;
pub mod uploads;
pub mod users;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Full API surface. CORS and trace layers are applied by the caller.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/uploads/{filename}", get(uploads::serve))
        .nest("/api/auth", auth::router())
        .nest("/api/posts", posts::router())
        .nest("/api/users", users::router())
        .nest("/api/projects", projects::router())
        .nest("/api/moderation", moderation::router())
        .nest("/api/admin", admin::router())
        .nest("/api/social", social::router())
        .nest("/api/settings", settings::router())
        .nest("/api/upload", uploads::router())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "OK" }))
}
