use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::models::{Comment, ReactionType, Role, UserSummary};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json, MaybeUser};
use crate::state::AppState;

const FEED_LIMIT: i64 = 50;

/// Post as rendered on the wire. `images` is canonical storage; the legacy
/// singular `image` is derived from it here so the two can never drift.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub content: String,
    pub image: Option<String>,
    pub images: Vec<String>,
    pub author: UserSummary,
    pub created_at: String,
    pub likes: i64,
    pub comments: i64,
    pub liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_reaction: Option<ReactionType>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub images: Vec<String>,
    /// Legacy clients still send a single image field.
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostRequest {
    pub content: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct ReactionRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(feed).post(create_post))
        .route(
            "/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/{id}/like", post(react))
        .route("/{id}/comments", post(create_comment))
}

async fn feed(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> AppResult<Response> {
    let user_id = user.map(|u| u.id);
    let conn = state.db.get()?;
    let posts = query_feed(&conn, user_id.as_deref())?;
    Ok(Json(posts).into_response())
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<Response> {
    let content = req.content.trim().to_string();
    let mut images = req.images;
    if images.is_empty() {
        if let Some(image) = req.image {
            if !image.is_empty() {
                images.push(image);
            }
        }
    }

    if content.is_empty() && images.is_empty() {
        return Err(AppError::Validation("Content is required".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO posts (id, content, images, author_id) VALUES (?1, ?2, ?3, ?4)",
        params![id, content, serde_json::to_string(&images)?, user.id],
    )?;

    let post = query_post(&conn, &id, Some(&user.id))?
        .ok_or_else(|| AppError::Internal("Post vanished after insert".into()))?;

    Ok((StatusCode::CREATED, Json(post)).into_response())
}

async fn get_post(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let user_id = user.map(|u| u.id);
    let conn = state.db.get()?;

    let post = query_post(&conn, &id, user_id.as_deref())?
        .ok_or_else(|| AppError::NotFound("Post not found".into()))?;
    let comments = query_comments(&conn, &id)?;

    let mut body = serde_json::to_value(&post)?;
    body["comments"] = serde_json::to_value(&comments)?;
    Ok(Json(body).into_response())
}

async fn update_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let author_id: String = conn
        .query_row("SELECT author_id FROM posts WHERE id = ?1", params![id], |r| {
            r.get(0)
        })
        .map_err(|_| AppError::NotFound("Post not found".into()))?;

    if author_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized".into()));
    }

    if let Some(content) = &req.content {
        conn.execute(
            "UPDATE posts SET content = ?1 WHERE id = ?2",
            params![content.trim(), id],
        )?;
    }
    if let Some(images) = &req.images {
        conn.execute(
            "UPDATE posts SET images = ?1 WHERE id = ?2",
            params![serde_json::to_string(images)?, id],
        )?;
    }

    let post = query_post(&conn, &id, Some(&user.id))?
        .ok_or_else(|| AppError::NotFound("Post not found".into()))?;
    Ok(Json(post).into_response())
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let author_id: String = conn
        .query_row("SELECT author_id FROM posts WHERE id = ?1", params![id], |r| {
            r.get(0)
        })
        .map_err(|_| AppError::NotFound("Post not found".into()))?;

    if author_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized".into()));
    }

    conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(Json(json!({ "message": "Post deleted" })).into_response())
}

/// Toggle-or-switch semantics: same type again removes the reaction, a
/// different type replaces it in place, so a user never holds more than one
/// reaction per post. The UNIQUE(post_id, user_id) constraint backstops
/// concurrent inserts.
async fn react(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<ReactionRequest>,
) -> AppResult<Response> {
    let kind = match req.kind {
        None => ReactionType::Like,
        Some(raw) => raw
            .to_uppercase()
            .parse()
            .map_err(|_| AppError::Validation("Invalid reaction type".into()))?,
    };

    let conn = state.db.get()?;

    let _: String = conn
        .query_row("SELECT id FROM posts WHERE id = ?1", params![post_id], |r| {
            r.get(0)
        })
        .map_err(|_| AppError::NotFound("Post not found".into()))?;

    let existing: Option<(String, ReactionType)> = conn
        .query_row(
            "SELECT id, type FROM reactions WHERE post_id = ?1 AND user_id = ?2",
            params![post_id, user.id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let body = match existing {
        Some((reaction_id, current)) if current == kind => {
            conn.execute("DELETE FROM reactions WHERE id = ?1", params![reaction_id])?;
            json!({ "liked": false })
        }
        Some((reaction_id, _)) => {
            conn.execute(
                "UPDATE reactions SET type = ?1 WHERE id = ?2",
                params![kind, reaction_id],
            )?;
            json!({ "liked": true, "type": kind })
        }
        None => {
            let id = uuid::Uuid::now_v7().to_string();
            conn.execute(
                "INSERT INTO reactions (id, post_id, user_id, type) VALUES (?1, ?2, ?3, ?4)",
                params![id, post_id, user.id, kind],
            )?;
            json!({ "liked": true, "type": kind })
        }
    };

    Ok(Json(body).into_response())
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(post_id): Path<String>,
    Json(req): Json<CreateCommentRequest>,
) -> AppResult<Response> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::Validation("Comment content is required".into()));
    }

    let conn = state.db.get()?;

    let _: String = conn
        .query_row("SELECT id FROM posts WHERE id = ?1", params![post_id], |r| {
            r.get(0)
        })
        .map_err(|_| AppError::NotFound("Post not found".into()))?;

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO comments (id, content, post_id, author_id) VALUES (?1, ?2, ?3, ?4)",
        params![id, content, post_id, user.id],
    )?;

    let comment = conn.query_row(
        "SELECT c.id, c.content, c.post_id, c.created_at,
                u.id, u.name, u.avatar, u.role, u.verified
         FROM comments c JOIN users u ON u.id = c.author_id
         WHERE c.id = ?1",
        params![id],
        map_comment_row,
    )?;

    Ok((StatusCode::CREATED, Json(comment)).into_response())
}

// --- Query helpers ---

const POST_SELECT: &str = "SELECT p.id, p.content, p.images, p.created_at,
        u.id, u.name, u.avatar, u.role, u.verified, u.school,
        (SELECT COUNT(*) FROM reactions r WHERE r.post_id = p.id) AS likes,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comments,
        (SELECT r.type FROM reactions r WHERE r.post_id = p.id AND r.user_id = ?1) AS my_reaction
 FROM posts p JOIN users u ON u.id = p.author_id";

fn map_post_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostView> {
    let images_json: String = row.get(2)?;
    let images: Vec<String> = serde_json::from_str(&images_json).unwrap_or_default();
    let my_reaction: Option<ReactionType> = row.get(12)?;

    Ok(PostView {
        id: row.get(0)?,
        content: row.get(1)?,
        image: images.first().cloned(),
        images,
        author: UserSummary {
            id: row.get(4)?,
            name: row.get(5)?,
            avatar: row.get(6)?,
            role: row.get::<_, Role>(7)?,
            verified: row.get(8)?,
            school: row.get(9)?,
        },
        created_at: row.get(3)?,
        likes: row.get(10)?,
        comments: row.get(11)?,
        liked: my_reaction.is_some(),
        my_reaction,
    })
}

pub fn query_feed(conn: &Connection, user_id: Option<&str>) -> AppResult<Vec<PostView>> {
    let sql = format!(
        "{} ORDER BY p.created_at DESC, p.id DESC LIMIT {}",
        POST_SELECT, FEED_LIMIT
    );
    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(params![user_id.unwrap_or("")], map_post_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn query_post(
    conn: &Connection,
    post_id: &str,
    user_id: Option<&str>,
) -> AppResult<Option<PostView>> {
    let sql = format!("{} WHERE p.id = ?2", POST_SELECT);
    let post = conn
        .query_row(&sql, params![user_id.unwrap_or(""), post_id], map_post_row)
        .optional()?;
    Ok(post)
}

fn map_comment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        content: row.get(1)?,
        post_id: row.get(2)?,
        created_at: row.get(3)?,
        author: UserSummary {
            id: row.get(4)?,
            name: row.get(5)?,
            avatar: row.get(6)?,
            role: row.get::<_, Role>(7)?,
            verified: row.get(8)?,
            school: None,
        },
    })
}

fn query_comments(conn: &Connection, post_id: &str) -> AppResult<Vec<Comment>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.content, c.post_id, c.created_at,
                u.id, u.name, u.avatar, u.role, u.verified
         FROM comments c JOIN users u ON u.id = c.author_id
         WHERE c.post_id = ?1
         ORDER BY c.created_at ASC, c.id ASC",
    )?;
    let comments = stmt
        .query_map(params![post_id], map_comment_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}
