use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;

use crate::db::models::Role;
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, Json};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub image: Option<String>,
    pub category: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_projects).post(create_project))
        .route("/category/{category}", get(by_category))
        .route("/{id}", get(get_project).delete(delete_project))
}

async fn create_project(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreateProjectRequest>,
) -> AppResult<Response> {
    if req.title.trim().is_empty() || req.description.trim().is_empty() {
        return Err(AppError::Validation(
            "Title and description are required".into(),
        ));
    }

    let category = req
        .category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| "Geral".to_string());

    let id = uuid::Uuid::now_v7().to_string();
    let conn = state.db.get()?;
    conn.execute(
        "INSERT INTO projects (id, title, description, image, category, author_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, req.title.trim(), req.description.trim(), req.image, category, user.id],
    )?;

    let project = query_project(&conn, &id)?
        .ok_or_else(|| AppError::Internal("Project vanished after insert".into()))?;

    Ok((StatusCode::CREATED, Json(project)).into_response())
}

async fn list_projects(State(state): State<AppState>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "{} ORDER BY p.created_at DESC, p.id DESC LIMIT 50",
        PROJECT_SELECT
    ))?;
    let projects = stmt
        .query_map([], map_project_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(projects).into_response())
}

async fn get_project(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Response> {
    let conn = state.db.get()?;
    let project =
        query_project(&conn, &id)?.ok_or_else(|| AppError::NotFound("Project not found".into()))?;
    Ok(Json(project).into_response())
}

async fn by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> AppResult<Response> {
    let pattern = format!("%{}%", category);
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(&format!(
        "{} WHERE p.category LIKE ?1 ORDER BY p.created_at DESC, p.id DESC",
        PROJECT_SELECT
    ))?;
    let projects = stmt
        .query_map(params![pattern], map_project_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(projects).into_response())
}

async fn delete_project(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let author_id: String = conn
        .query_row(
            "SELECT author_id FROM projects WHERE id = ?1",
            params![id],
            |r| r.get(0),
        )
        .map_err(|_| AppError::NotFound("Project not found".into()))?;

    if author_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden("Not authorized".into()));
    }

    conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    Ok(Json(json!({ "message": "Project deleted" })).into_response())
}

// --- Query helpers ---

const PROJECT_SELECT: &str = "SELECT p.id, p.title, p.description, p.image, p.category, p.created_at,
        u.id, u.name, u.avatar, u.role, u.school
 FROM projects p JOIN users u ON u.id = p.author_id";

fn map_project_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    Ok(json!({
        "id": row.get::<_, String>(0)?,
        "title": row.get::<_, String>(1)?,
        "description": row.get::<_, String>(2)?,
        "image": row.get::<_, Option<String>>(3)?,
        "category": row.get::<_, String>(4)?,
        "createdAt": row.get::<_, String>(5)?,
        "author": {
            "id": row.get::<_, String>(6)?,
            "name": row.get::<_, String>(7)?,
            "avatar": row.get::<_, Option<String>>(8)?,
            "role": row.get::<_, Role>(9)?,
            "school": row.get::<_, Option<String>>(10)?,
        },
    }))
}

fn query_project(conn: &Connection, id: &str) -> AppResult<Option<serde_json::Value>> {
    let sql = format!("{} WHERE p.id = ?1", PROJECT_SELECT);
    let project = conn.query_row(&sql, params![id], map_project_row).optional()?;
    Ok(project)
}
