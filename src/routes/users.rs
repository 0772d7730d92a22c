use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;

use crate::auth::password;
use crate::db::models::Role;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json, MaybeUser};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub role: Option<String>,
    pub school_type: Option<String>,
    pub school_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub school: Option<String>,
    pub password: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/featured-schools", get(featured_schools))
        .route("/me", put(update_me))
        .route("/search/{query}", get(search_users))
        .route("/{id}", get(get_user))
        .route("/{id}/follow", post(toggle_follow))
        .route("/{id}/followers", get(followers))
        .route("/{id}/following", get(following))
}

/// Network suggestions: recent users with optional role/school filters,
/// excluding the caller.
async fn list_users(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<ListUsersQuery>,
) -> AppResult<Response> {
    let mut sql = String::from(
        "SELECT id, name, email, role, avatar, school, school_type, school_id, verified,
                (SELECT COUNT(*) FROM user_follows WHERE following_id = users.id)
         FROM users WHERE 1=1",
    );
    let mut bind: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(role) = &query.role {
        if role != "TODAS" {
            sql.push_str(" AND role = ?");
            bind.push(Box::new(role.to_uppercase()));
        }
    }
    if let Some(school_type) = &query.school_type {
        sql.push_str(" AND school_type = ?");
        bind.push(Box::new(school_type.clone()));
    }
    if let Some(school_id) = &query.school_id {
        sql.push_str(" AND school_id = ?");
        bind.push(Box::new(school_id.clone()));
    }
    if let Some(user) = &user {
        sql.push_str(" AND id != ?");
        bind.push(Box::new(user.id.clone()));
    }
    sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT 50");

    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "email": row.get::<_, String>(2)?,
                "role": row.get::<_, Role>(3)?,
                "avatar": row.get::<_, Option<String>>(4)?,
                "school": row.get::<_, Option<String>>(5)?,
                "schoolType": row.get::<_, Option<String>>(6)?,
                "schoolId": row.get::<_, Option<String>>(7)?,
                "verified": row.get::<_, bool>(8)?,
                "followers": row.get::<_, i64>(9)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users).into_response())
}

/// School ranking by engagement: posts count once, projects three times,
/// followers once.
async fn featured_schools(State(state): State<AppState>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, avatar, school_type, verified,
                (SELECT COUNT(*) FROM posts WHERE author_id = users.id)
                + (SELECT COUNT(*) FROM projects WHERE author_id = users.id) * 3
                + (SELECT COUNT(*) FROM user_follows WHERE following_id = users.id)
                AS engagement
         FROM users WHERE role = 'ESCOLA'
         ORDER BY engagement DESC, name ASC LIMIT 5",
    )?;
    let schools = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "avatar": row.get::<_, Option<String>>(2)?,
                "schoolType": row.get::<_, Option<String>>(3)?,
                "verified": row.get::<_, bool>(4)?,
                "engagement": row.get::<_, i64>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(schools).into_response())
}

async fn update_me(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<UpdateMeRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    if let Some(name) = req.name.as_deref().filter(|s| !s.is_empty()) {
        conn.execute(
            "UPDATE users SET name = ?1 WHERE id = ?2",
            params![name, user.id],
        )?;
    }
    if let Some(avatar) = req.avatar.as_deref().filter(|s| !s.is_empty()) {
        conn.execute(
            "UPDATE users SET avatar = ?1 WHERE id = ?2",
            params![avatar, user.id],
        )?;
    }
    if let Some(bio) = req.bio.as_deref().filter(|s| !s.is_empty()) {
        conn.execute(
            "UPDATE users SET bio = ?1 WHERE id = ?2",
            params![bio, user.id],
        )?;
    }
    if let Some(school) = req.school.as_deref().filter(|s| !s.is_empty()) {
        conn.execute(
            "UPDATE users SET school = ?1 WHERE id = ?2",
            params![school, user.id],
        )?;
    }
    if let Some(new_password) = req.password.as_deref().filter(|s| !s.is_empty()) {
        let hashed = password::hash(new_password)?;
        conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![hashed, user.id],
        )?;
    }

    let updated = conn
        .query_row(
            "SELECT id, name, email, role, avatar, bio, school, verified FROM users WHERE id = ?1",
            params![user.id],
            |row| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "name": row.get::<_, String>(1)?,
                    "email": row.get::<_, String>(2)?,
                    "role": row.get::<_, Role>(3)?,
                    "avatar": row.get::<_, Option<String>>(4)?,
                    "bio": row.get::<_, Option<String>>(5)?,
                    "school": row.get::<_, Option<String>>(6)?,
                    "verified": row.get::<_, bool>(7)?,
                }))
            },
        )
        .map_err(|_| AppError::NotFound("User not found".into()))?;

    Ok(Json(updated).into_response())
}

async fn get_user(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let mut profile = conn
        .query_row(
            "SELECT id, name, email, role, avatar, bio, school, verified,
                    (SELECT COUNT(*) FROM user_follows WHERE following_id = u.id),
                    (SELECT COUNT(*) FROM user_follows WHERE follower_id = u.id),
                    (SELECT COUNT(*) FROM posts WHERE author_id = u.id),
                    (SELECT COUNT(*) FROM projects WHERE author_id = u.id)
             FROM users u WHERE id = ?1",
            params![id],
            |row| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "name": row.get::<_, String>(1)?,
                    "email": row.get::<_, String>(2)?,
                    "role": row.get::<_, Role>(3)?,
                    "avatar": row.get::<_, Option<String>>(4)?,
                    "bio": row.get::<_, Option<String>>(5)?,
                    "school": row.get::<_, Option<String>>(6)?,
                    "verified": row.get::<_, bool>(7)?,
                    "stats": {
                        "followers": row.get::<_, i64>(8)?,
                        "following": row.get::<_, i64>(9)?,
                        "posts": row.get::<_, i64>(10)?,
                        "projects": row.get::<_, i64>(11)?,
                    },
                }))
            },
        )
        .map_err(|_| AppError::NotFound("User not found".into()))?;

    let is_following = match &viewer {
        Some(viewer) => follow_exists(&conn, &viewer.id, &id)?,
        None => false,
    };
    profile["isFollowing"] = json!(is_following);

    Ok(Json(profile).into_response())
}

/// Single toggle endpoint: a second call undoes the first.
async fn toggle_follow(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    if user.id == id {
        return Err(AppError::Validation("Cannot follow yourself".into()));
    }

    let conn = state.db.get()?;

    let target_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    if !target_exists {
        return Err(AppError::NotFound("User not found".into()));
    }

    if follow_exists(&conn, &user.id, &id)? {
        conn.execute(
            "DELETE FROM user_follows WHERE follower_id = ?1 AND following_id = ?2",
            params![user.id, id],
        )?;
        return Ok(Json(json!({ "following": false })).into_response());
    }

    let follow_id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO user_follows (id, follower_id, following_id) VALUES (?1, ?2, ?3)",
        params![follow_id, user.id, id],
    )?;

    Ok(Json(json!({ "following": true })).into_response())
}

async fn followers(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let users = query_follow_edge(&conn, &id, FollowEdge::Followers)?;
    Ok(Json(users).into_response())
}

async fn following(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let users = query_follow_edge(&conn, &id, FollowEdge::Following)?;
    Ok(Json(users).into_response())
}

async fn search_users(
    State(state): State<AppState>,
    Path(query): Path<String>,
) -> AppResult<Response> {
    let pattern = format!("%{}%", query);
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, avatar, role, school, school_type, school_id, verified
         FROM users
         WHERE name LIKE ?1 OR email LIKE ?1 OR school LIKE ?1
         ORDER BY name ASC LIMIT 20",
    )?;
    let users = stmt
        .query_map(params![pattern], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "avatar": row.get::<_, Option<String>>(2)?,
                "role": row.get::<_, Role>(3)?,
                "school": row.get::<_, Option<String>>(4)?,
                "schoolType": row.get::<_, Option<String>>(5)?,
                "schoolId": row.get::<_, Option<String>>(6)?,
                "verified": row.get::<_, bool>(7)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users).into_response())
}

// --- Query helpers ---

fn follow_exists(conn: &Connection, follower_id: &str, following_id: &str) -> AppResult<bool> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM user_follows WHERE follower_id = ?1 AND following_id = ?2",
            params![follower_id, following_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(exists.is_some())
}

enum FollowEdge {
    Followers,
    Following,
}

fn query_follow_edge(
    conn: &Connection,
    user_id: &str,
    edge: FollowEdge,
) -> AppResult<Vec<serde_json::Value>> {
    let sql = match edge {
        FollowEdge::Followers => {
            "SELECT u.id, u.name, u.avatar, u.role FROM user_follows f
             JOIN users u ON u.id = f.follower_id
             WHERE f.following_id = ?1 ORDER BY f.created_at DESC"
        }
        FollowEdge::Following => {
            "SELECT u.id, u.name, u.avatar, u.role FROM user_follows f
             JOIN users u ON u.id = f.following_id
             WHERE f.follower_id = ?1 ORDER BY f.created_at DESC"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let users = stmt
        .query_map(params![user_id], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "avatar": row.get::<_, Option<String>>(2)?,
                "role": row.get::<_, Role>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(users)
}
