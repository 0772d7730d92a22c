use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::ModerationStatus;
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, CurrentUser, Json};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct FlagRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub reason: Option<String>,
    #[serde(default)]
    pub delete_post: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items))
        .route("/flag/{post_id}", post(flag_post))
        .route("/{id}/approve", put(approve))
        .route("/{id}/reject", put(reject))
}

async fn list_items(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT m.id, m.post_id, m.reason, m.status, m.created_at,
                p.content, a.name, a.school, mod_user.name
         FROM moderation_items m
         JOIN posts p ON p.id = m.post_id
         JOIN users a ON a.id = p.author_id
         LEFT JOIN users mod_user ON mod_user.id = m.moderator_id
         ORDER BY m.created_at DESC, m.id DESC",
    )?;
    let items = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "postId": row.get::<_, String>(1)?,
                "reason": row.get::<_, String>(2)?,
                "status": row.get::<_, ModerationStatus>(3)?,
                "createdAt": row.get::<_, String>(4)?,
                "post": {
                    "content": row.get::<_, String>(5)?,
                    "author": {
                        "name": row.get::<_, String>(6)?,
                        "school": row.get::<_, Option<String>>(7)?,
                    },
                },
                "moderator": row.get::<_, Option<String>>(8)?.map(|name| json!({ "name": name })),
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(items).into_response())
}

/// Any authenticated user may flag a post; only one open record per post.
async fn flag_post(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<FlagRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let post_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |r| r.get(0),
    )?;
    if !post_exists {
        return Err(AppError::NotFound("Post not found".into()));
    }

    let already_flagged: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM moderation_items WHERE post_id = ?1",
        params![post_id],
        |r| r.get(0),
    )?;
    if already_flagged {
        return Err(AppError::Validation("Post already flagged".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let reason = req
        .reason
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "User report".to_string());
    conn.execute(
        "INSERT INTO moderation_items (id, post_id, reason) VALUES (?1, ?2, ?3)",
        params![id, post_id, reason],
    )?;

    let item = query_item(&conn, &id)?
        .ok_or_else(|| AppError::Internal("Moderation item vanished after insert".into()))?;

    Ok((StatusCode::CREATED, Json(item)).into_response())
}

async fn approve(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let status = current_status(&conn, &id)?;
    if status != ModerationStatus::Pendente {
        return Err(AppError::Validation(
            "Moderation item already resolved".into(),
        ));
    }

    conn.execute(
        "UPDATE moderation_items SET status = ?1, moderator_id = ?2 WHERE id = ?3",
        params![ModerationStatus::Aprovado, admin.id, id],
    )?;

    let item = query_item(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Moderation item not found".into()))?;
    Ok(Json(item).into_response())
}

/// Rejecting may also delete the flagged post; both writes commit in a
/// single transaction so a crash cannot leave a rejected record pointing at
/// a live post.
async fn reject(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> AppResult<Response> {
    let mut conn = state.db.get()?;

    let status = current_status(&conn, &id)?;
    if status != ModerationStatus::Pendente {
        return Err(AppError::Validation(
            "Moderation item already resolved".into(),
        ));
    }

    let item = {
        let tx = conn.transaction()?;

        if let Some(reason) = req.reason.as_deref().filter(|r| !r.trim().is_empty()) {
            tx.execute(
                "UPDATE moderation_items SET reason = ?1 WHERE id = ?2",
                params![reason, id],
            )?;
        }
        tx.execute(
            "UPDATE moderation_items SET status = ?1, moderator_id = ?2 WHERE id = ?3",
            params![ModerationStatus::Reprovado, admin.id, id],
        )?;

        let item = query_item(&tx, &id)?
            .ok_or_else(|| AppError::NotFound("Moderation item not found".into()))?;

        if req.delete_post {
            // Cascade removes the moderation record with the post; the item
            // snapshot above is what the client gets back.
            let post_id = item["postId"]
                .as_str()
                .ok_or_else(|| AppError::Internal("Moderation item missing postId".into()))?
                .to_string();
            tx.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
        }

        tx.commit()?;
        item
    };

    Ok(Json(item).into_response())
}

// --- Query helpers ---

fn current_status(conn: &Connection, id: &str) -> AppResult<ModerationStatus> {
    conn.query_row(
        "SELECT status FROM moderation_items WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )
    .map_err(|_| AppError::NotFound("Moderation item not found".into()))
}

fn query_item(conn: &Connection, id: &str) -> AppResult<Option<serde_json::Value>> {
    let item = conn
        .query_row(
            "SELECT m.id, m.post_id, m.reason, m.status, m.moderator_id, m.created_at, p.content
             FROM moderation_items m JOIN posts p ON p.id = m.post_id
             WHERE m.id = ?1",
            params![id],
            |row| {
                Ok(json!({
                    "id": row.get::<_, String>(0)?,
                    "postId": row.get::<_, String>(1)?,
                    "reason": row.get::<_, String>(2)?,
                    "status": row.get::<_, ModerationStatus>(3)?,
                    "moderatorId": row.get::<_, Option<String>>(4)?,
                    "createdAt": row.get::<_, String>(5)?,
                    "post": { "content": row.get::<_, String>(6)? },
                }))
            },
        )
        .optional()?;
    Ok(item)
}
