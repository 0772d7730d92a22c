use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::{BadgeType, Role, TestimonialStatus, WeeklyEvent};
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, CurrentUser, Json};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct GiveBadgeRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestimonialRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub receiver_id: String,
}

#[derive(Deserialize)]
pub struct TestimonialStatusRequest {
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateEventRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date: String,
    pub link: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/badge/{receiver_id}", post(give_badge))
        .route("/badges/{user_id}", get(badge_counts))
        .route("/profile-view/{profile_id}", post(record_profile_view))
        .route("/profile-visitors", get(profile_visitors))
        .route("/testimonial", post(create_testimonial))
        .route("/testimonials/pending", get(pending_testimonials))
        .route("/testimonials/{user_id}", get(approved_testimonials))
        .route("/testimonial/{id}/status", put(set_testimonial_status))
        .route("/trending-tags", get(trending_tags))
        .route("/events", get(list_events).post(create_event))
        .route("/events/{id}", delete(delete_event))
}

// --- Badges ---

/// Peer recognition. Awarding the same badge twice is a no-op rather than an
/// error, so the client can stay dumb about prior awards.
async fn give_badge(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(receiver_id): Path<String>,
    Json(req): Json<GiveBadgeRequest>,
) -> AppResult<Response> {
    if user.id == receiver_id {
        return Err(AppError::Validation(
            "You cannot give a badge to yourself".into(),
        ));
    }

    let kind: BadgeType = req
        .kind
        .as_deref()
        .unwrap_or("")
        .to_uppercase()
        .parse()
        .map_err(|_| AppError::Validation("Invalid badge type".into()))?;

    let conn = state.db.get()?;

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO badges (id, giver_id, receiver_id, type) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(giver_id, receiver_id, type) DO NOTHING",
        params![id, user.id, receiver_id, kind],
    )?;

    let badge = conn.query_row(
        "SELECT id, giver_id, receiver_id, type FROM badges
         WHERE giver_id = ?1 AND receiver_id = ?2 AND type = ?3",
        params![user.id, receiver_id, kind],
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "giverId": row.get::<_, String>(1)?,
                "receiverId": row.get::<_, String>(2)?,
                "type": row.get::<_, BadgeType>(3)?,
            }))
        },
    )?;

    Ok((StatusCode::CREATED, Json(badge)).into_response())
}

async fn badge_counts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt =
        conn.prepare("SELECT type, COUNT(*) FROM badges WHERE receiver_id = ?1 GROUP BY type")?;
    let mut counts: HashMap<BadgeType, i64> = HashMap::new();
    let rows = stmt.query_map(params![user_id], |row| {
        Ok((row.get::<_, BadgeType>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (kind, count) = row?;
        counts.insert(kind, count);
    }

    Ok(Json(json!({
        "PROATIVO": counts.get(&BadgeType::Proativo).copied().unwrap_or(0),
        "ESPECIAL": counts.get(&BadgeType::Especial).copied().unwrap_or(0),
        "HARMONIOSO": counts.get(&BadgeType::Harmonioso).copied().unwrap_or(0),
    }))
    .into_response())
}

// --- Profile views ---

async fn record_profile_view(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(profile_id): Path<String>,
) -> AppResult<Response> {
    // Own views are not counted
    if user.id == profile_id {
        return Ok(StatusCode::OK.into_response());
    }

    let conn = state.db.get()?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO profile_views (id, viewer_id, profile_id) VALUES (?1, ?2, ?3)",
        params![id, user.id, profile_id],
    )?;

    Ok(StatusCode::CREATED.into_response())
}

async fn profile_visitors(State(state): State<AppState>, user: CurrentUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.avatar, u.role, MAX(v.created_at) AS last_seen
         FROM profile_views v JOIN users u ON u.id = v.viewer_id
         WHERE v.profile_id = ?1
         GROUP BY v.viewer_id
         ORDER BY last_seen DESC
         LIMIT 10",
    )?;
    let visitors = stmt
        .query_map(params![user.id], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "avatar": row.get::<_, Option<String>>(2)?,
                "role": row.get::<_, Role>(3)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(visitors).into_response())
}

// --- Testimonials ---

async fn create_testimonial(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateTestimonialRequest>,
) -> AppResult<Response> {
    if req.content.trim().is_empty() || req.receiver_id.is_empty() {
        return Err(AppError::Validation(
            "Content and receiverId are required".into(),
        ));
    }

    let conn = state.db.get()?;

    let receiver_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
        params![req.receiver_id],
        |r| r.get(0),
    )?;
    if !receiver_exists {
        return Err(AppError::NotFound("User not found".into()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO testimonials (id, sender_id, receiver_id, content) VALUES (?1, ?2, ?3, ?4)",
        params![id, user.id, req.receiver_id, req.content.trim()],
    )?;

    let testimonial = conn.query_row(
        "SELECT id, sender_id, receiver_id, content, status, created_at
         FROM testimonials WHERE id = ?1",
        params![id],
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "senderId": row.get::<_, String>(1)?,
                "receiverId": row.get::<_, String>(2)?,
                "content": row.get::<_, String>(3)?,
                "status": row.get::<_, TestimonialStatus>(4)?,
                "createdAt": row.get::<_, String>(5)?,
            }))
        },
    )?;

    Ok((StatusCode::CREATED, Json(testimonial)).into_response())
}

/// Pending testimonials are visible only to their receiver.
async fn pending_testimonials(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let testimonials = query_testimonials(&conn, &user.id, TestimonialStatus::Pending)?;
    Ok(Json(testimonials).into_response())
}

async fn approved_testimonials(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let testimonials = query_testimonials(&conn, &user_id, TestimonialStatus::Approved)?;
    Ok(Json(testimonials).into_response())
}

/// Receiver-only transition out of PENDING; terminal states stay terminal.
async fn set_testimonial_status(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<TestimonialStatusRequest>,
) -> AppResult<Response> {
    let status: TestimonialStatus = req
        .status
        .as_deref()
        .unwrap_or("")
        .parse()
        .map_err(|_| AppError::Validation("Invalid status".into()))?;
    if status == TestimonialStatus::Pending {
        return Err(AppError::Validation("Invalid status".into()));
    }

    let conn = state.db.get()?;

    let row: Option<(String, TestimonialStatus)> = conn
        .query_row(
            "SELECT receiver_id, status FROM testimonials WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    let (receiver_id, current) =
        row.ok_or_else(|| AppError::NotFound("Testimonial not found".into()))?;
    if receiver_id != user.id {
        return Err(AppError::Forbidden("Unauthorized".into()));
    }
    if current != TestimonialStatus::Pending {
        return Err(AppError::Validation("Testimonial already resolved".into()));
    }

    conn.execute(
        "UPDATE testimonials SET status = ?1 WHERE id = ?2",
        params![status, id],
    )?;

    let updated = conn.query_row(
        "SELECT id, sender_id, receiver_id, content, status, created_at
         FROM testimonials WHERE id = ?1",
        params![id],
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "senderId": row.get::<_, String>(1)?,
                "receiverId": row.get::<_, String>(2)?,
                "content": row.get::<_, String>(3)?,
                "status": row.get::<_, TestimonialStatus>(4)?,
                "createdAt": row.get::<_, String>(5)?,
            }))
        },
    )?;

    Ok(Json(updated).into_response())
}

// --- Trending tags ---

/// Hashtag counts over the most recent 100 posts.
async fn trending_tags(State(state): State<AppState>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT content FROM posts ORDER BY created_at DESC, id DESC LIMIT 100",
    )?;
    let contents = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut counts: HashMap<String, i64> = HashMap::new();
    for content in &contents {
        for tag in extract_hashtags(content) {
            *counts.entry(tag).or_insert(0) += 1;
        }
    }

    let mut tags: Vec<(String, i64)> = counts.into_iter().collect();
    tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    tags.truncate(10);

    let body: Vec<serde_json::Value> = tags
        .into_iter()
        .map(|(name, count)| json!({ "name": name, "count": count }))
        .collect();

    Ok(Json(body).into_response())
}

// --- Weekly events ---

async fn list_events(State(state): State<AppState>) -> AppResult<Response> {
    let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, name, date, link FROM weekly_events
         WHERE date >= ?1 ORDER BY date ASC LIMIT 5",
    )?;
    let events = stmt
        .query_map(params![now], |row| {
            Ok(WeeklyEvent {
                id: row.get(0)?,
                name: row.get(1)?,
                date: row.get(2)?,
                link: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(events).into_response())
}

async fn create_event(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<CreateEventRequest>,
) -> AppResult<Response> {
    if req.name.trim().is_empty() || req.date.trim().is_empty() {
        return Err(AppError::Validation("Name and date are required".into()));
    }

    let conn = state.db.get()?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO weekly_events (id, name, date, link) VALUES (?1, ?2, ?3, ?4)",
        params![id, req.name.trim(), req.date.trim(), req.link],
    )?;

    let event = conn.query_row(
        "SELECT id, name, date, link FROM weekly_events WHERE id = ?1",
        params![id],
        |row| {
            Ok(WeeklyEvent {
                id: row.get(0)?,
                name: row.get(1)?,
                date: row.get(2)?,
                link: row.get(3)?,
            })
        },
    )?;

    Ok((StatusCode::CREATED, Json(event)).into_response())
}

async fn delete_event(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let deleted = conn.execute("DELETE FROM weekly_events WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(AppError::NotFound("Event not found".into()));
    }
    Ok(Json(json!({ "message": "Event deleted" })).into_response())
}

// --- Query helpers ---

fn query_testimonials(
    conn: &Connection,
    receiver_id: &str,
    status: TestimonialStatus,
) -> AppResult<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.content, t.status, t.created_at, u.id, u.name, u.avatar
         FROM testimonials t JOIN users u ON u.id = t.sender_id
         WHERE t.receiver_id = ?1 AND t.status = ?2
         ORDER BY t.created_at DESC, t.id DESC",
    )?;
    let testimonials = stmt
        .query_map(params![receiver_id, status], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "content": row.get::<_, String>(1)?,
                "status": row.get::<_, TestimonialStatus>(2)?,
                "createdAt": row.get::<_, String>(3)?,
                "sender": {
                    "id": row.get::<_, String>(4)?,
                    "name": row.get::<_, String>(5)?,
                    "avatar": row.get::<_, Option<String>>(6)?,
                },
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(testimonials)
}

fn extract_hashtags(content: &str) -> Vec<String> {
    content
        .split_whitespace()
        .filter_map(|word| {
            let tag = word.trim_start_matches('#');
            if word.starts_with('#') && !tag.is_empty() && tag.chars().all(|c| c.is_alphanumeric())
            {
                Some(format!("#{}", tag.to_lowercase()))
            } else {
                None
            }
        })
        .collect()
}
