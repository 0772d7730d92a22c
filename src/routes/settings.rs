use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::{params, OptionalExtension};
use serde_json::{json, Map, Value};

use crate::error::AppResult;
use crate::state::AppState;

/// Settings safe to hand to unauthenticated clients. Everything else in
/// `system_settings` is admin-only and served from the admin router.
const PUBLIC_KEYS: [&str; 4] = ["APP_NAME", "PRIMARY_COLOR", "LOGO_URL", "FAVICON_URL"];

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(public_settings))
}

async fn public_settings(State(state): State<AppState>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut settings = Map::new();
    let mut stmt = conn.prepare("SELECT value FROM system_settings WHERE key = ?1")?;
    for key in PUBLIC_KEYS {
        let value: Option<String> = stmt
            .query_row(params![key], |row| row.get(0))
            .optional()?;
        if let Some(value) = value {
            settings.insert(key.to_string(), json!(value));
        }
    }

    Ok(Json(Value::Object(settings)).into_response())
}
