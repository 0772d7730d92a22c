use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{password, token};
use crate::db::models::Role;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json};
use crate::state::AppState;

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub role: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// The user shape returned alongside a token. Never carries the hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthUser {
    id: String,
    email: String,
    name: String,
    role: Role,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/profile", get(profile))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Response> {
    if req.email.is_empty() || req.password.is_empty() || req.name.is_empty() || req.role.is_empty()
    {
        return Err(AppError::Validation("Missing required fields".into()));
    }

    let role: Role = req
        .role
        .to_uppercase()
        .parse()
        .map_err(AppError::Validation)?;

    let conn = state.db.get()?;

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![req.email],
        |row| row.get(0),
    )?;
    if exists {
        return Err(AppError::Validation("Email already exists".into()));
    }

    let hashed = password::hash(&req.password)?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, email, password_hash, name, role) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, req.email, hashed, req.name, role],
    )?;

    let token = token::issue(
        &id,
        role,
        &state.config.auth.jwt_secret,
        state.config.auth.token_days,
    )?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered successfully",
            "token": token,
            "user": AuthUser {
                id,
                email: req.email,
                name: req.name,
                role,
            },
        })),
    )
        .into_response())
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Email and password required".into()));
    }

    let conn = state.db.get()?;

    // Unknown email and wrong password produce the same response so the
    // error message cannot be used to enumerate accounts.
    let row = conn
        .query_row(
            "SELECT id, password_hash, name, role FROM users WHERE email = ?1",
            params![req.email],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Role>(3)?,
                ))
            },
        )
        .map_err(|_| AppError::Unauthorized("Invalid credentials".into()))?;

    let (id, hash, name, role) = row;
    if !password::verify(&req.password, &hash) {
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let token = token::issue(
        &id,
        role,
        &state.config.auth.jwt_secret,
        state.config.auth.token_days,
    )?;

    Ok(Json(json!({
        "message": "Login successful",
        "token": token,
        "user": AuthUser {
            id,
            email: req.email,
            name,
            role,
        },
    }))
    .into_response())
}

async fn profile(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;

    let profile = conn
        .query_row(
            "SELECT id, email, name, role, avatar, bio, school, verified,
                    (SELECT COUNT(*) FROM user_follows WHERE following_id = u.id),
                    (SELECT COUNT(*) FROM user_follows WHERE follower_id = u.id),
                    (SELECT COUNT(*) FROM posts WHERE author_id = u.id)
             FROM users u WHERE id = ?1",
            params![user.id],
            |row| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "email": row.get::<_, String>(1)?,
                    "name": row.get::<_, String>(2)?,
                    "role": row.get::<_, Role>(3)?,
                    "avatar": row.get::<_, Option<String>>(4)?,
                    "bio": row.get::<_, Option<String>>(5)?,
                    "school": row.get::<_, Option<String>>(6)?,
                    "verified": row.get::<_, bool>(7)?,
                    "stats": {
                        "followers": row.get::<_, i64>(8)?,
                        "following": row.get::<_, i64>(9)?,
                        "posts": row.get::<_, i64>(10)?,
                    },
                }))
            },
        )
        .map_err(|_| AppError::NotFound("User not found".into()))?;

    Ok(Json(profile).into_response())
}
