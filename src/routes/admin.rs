use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use chrono::{Datelike, Utc};
use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::json;

use crate::auth::password;
use crate::db::models::Role;
use crate::error::{AppError, AppResult};
use crate::extractors::{AdminUser, Json};
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: i64 = 10;
const DEFAULT_IMPORT_PASSWORD: &str = "muda1234";

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub role: Option<String>,
    pub zone: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
    pub school: Option<String>,
    pub school_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub school: Option<String>,
}

#[derive(Deserialize)]
pub struct ImportUsersRequest {
    #[serde(default)]
    pub users: Vec<ImportUserRow>,
}

#[derive(Deserialize)]
pub struct ImportUserRow {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub school: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSchoolRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub inep: Option<String>,
    pub zone: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub school_type: Option<String>,
}

#[derive(Deserialize)]
pub struct ImportSchoolsRequest {
    #[serde(default)]
    pub schools: Vec<ImportSchoolRow>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSchoolRow {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub inep: Option<serde_json::Value>,
    pub zone: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub school_type: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/users", get(list_users).post(create_user))
        .route("/users/export", get(export_users))
        .route("/users/import", post(import_users))
        .route("/users/{id}", put(update_user).delete(delete_user))
        .route("/schools", get(list_schools).post(create_school))
        .route("/schools/import", post(import_schools))
        .route("/schools/template", get(schools_template))
        .route("/reports/growth", get(growth_report))
}

async fn stats(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Response> {
    let conn = state.db.get()?;

    let users_total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
    let posts_total: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?;
    let pending: i64 = conn.query_row(
        "SELECT COUNT(*) FROM moderation_items WHERE status = 'PENDENTE'",
        [],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, name, email, role, created_at, school FROM users
         ORDER BY created_at DESC, id DESC LIMIT 5",
    )?;
    let recent_users = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "email": row.get::<_, String>(2)?,
                "role": row.get::<_, Role>(3)?,
                "createdAt": row.get::<_, String>(4)?,
                "school": row.get::<_, Option<String>>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(json!({
        "users": { "total": users_total, "trend": "+12%" },
        "posts": { "total": posts_total, "trend": "+5.4%" },
        "moderation": {
            "pending": pending,
            "trend": if pending > 0 { "+1" } else { "0" },
        },
        "recentUsers": recent_users,
    }))
    .into_response())
}

// --- Settings ---

async fn get_settings(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare("SELECT key, value FROM system_settings")?;
    let mut settings = serde_json::Map::new();
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (key, value) = row?;
        settings.insert(key, json!(value));
    }
    Ok(Json(serde_json::Value::Object(settings)).into_response())
}

/// Per-key upsert of every entry in the body.
async fn put_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(body): Json<HashMap<String, serde_json::Value>>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    for (key, value) in body {
        let value = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        conn.execute(
            "INSERT INTO system_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
    }
    Ok(Json(json!({ "message": "Settings updated successfully" })).into_response())
}

// --- User management ---

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let offset = (page - 1) * limit;

    let mut where_sql = String::from(" WHERE 1=1");
    let mut bind: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        where_sql.push_str(" AND (name LIKE ? OR email LIKE ? OR school LIKE ?)");
        let pattern = format!("%{}%", search);
        bind.push(Box::new(pattern.clone()));
        bind.push(Box::new(pattern.clone()));
        bind.push(Box::new(pattern));
    }
    if let Some(role) = query.role.as_deref().filter(|r| !r.is_empty()) {
        where_sql.push_str(" AND role = ?");
        bind.push(Box::new(role.to_uppercase()));
    }

    let conn = state.db.get()?;

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users{}", where_sql),
        rusqlite::params_from_iter(bind.iter()),
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT id, name, email, role, school, created_at, avatar FROM users{}
         ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
        where_sql, limit, offset
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "email": row.get::<_, String>(2)?,
                "role": row.get::<_, Role>(3)?,
                "school": row.get::<_, Option<String>>(4)?,
                "createdAt": row.get::<_, String>(5)?,
                "avatar": row.get::<_, Option<String>>(6)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(json!({
        "users": users,
        "total": total,
        "page": page,
        "totalPages": (total + limit - 1) / limit,
    }))
    .into_response())
}

async fn create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<CreateUserRequest>,
) -> AppResult<Response> {
    if req.name.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Missing required fields".into()));
    }

    let role = match req.role.as_deref().filter(|r| !r.is_empty()) {
        Some(raw) => raw
            .to_uppercase()
            .parse()
            .map_err(AppError::Validation)?,
        None => Role::Aluno,
    };

    let conn = state.db.get()?;
    if email_exists(&conn, &req.email)? {
        return Err(AppError::Validation("Email already exists".into()));
    }

    let hashed = password::hash(&req.password)?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, school, school_id, verified)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
        params![id, req.name, req.email, hashed, role, req.school, req.school_id],
    )?;

    let user = sanitized_user(&conn, &id)?;
    Ok((StatusCode::CREATED, Json(user)).into_response())
}

async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
        params![id],
        |r| r.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound("User not found".into()));
    }

    if let Some(name) = req.name.as_deref().filter(|s| !s.is_empty()) {
        conn.execute("UPDATE users SET name = ?1 WHERE id = ?2", params![name, id])?;
    }
    if let Some(email) = req.email.as_deref().filter(|s| !s.is_empty()) {
        conn.execute(
            "UPDATE users SET email = ?1 WHERE id = ?2",
            params![email, id],
        )?;
    }
    if let Some(raw) = req.role.as_deref().filter(|s| !s.is_empty()) {
        let role: Role = raw
            .to_uppercase()
            .parse()
            .map_err(AppError::Validation)?;
        conn.execute("UPDATE users SET role = ?1 WHERE id = ?2", params![role, id])?;
    }
    if let Some(school) = req.school.as_deref().filter(|s| !s.is_empty()) {
        conn.execute(
            "UPDATE users SET school = ?1 WHERE id = ?2",
            params![school, id],
        )?;
    }

    let user = sanitized_user(&conn, &id)?;
    Ok(Json(user).into_response())
}

async fn delete_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    let deleted = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }
    Ok(Json(json!({ "message": "User deleted successfully" })).into_response())
}

/// CSV export. Commas are stripped from free-text fields instead of quoted;
/// this matches the legacy exporter byte for byte (see DESIGN.md).
async fn export_users(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Response> {
    let conn = state.db.get()?;
    let mut stmt = conn.prepare(
        "SELECT name, email, role, school, created_at FROM users
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Role>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let csv = render_users_csv(&rows);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"users_export.csv\"".to_string(),
            ),
        ],
        csv,
    )
        .into_response())
}

/// Bulk import: each row succeeds or fails on its own; a bad row never
/// aborts the batch.
async fn import_users(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<ImportUsersRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let mut success = 0;
    let mut failed = 0;
    let mut errors: Vec<String> = Vec::new();

    for row in req.users {
        let email = match row.email.as_deref().filter(|e| !e.is_empty()) {
            Some(email) => email.to_string(),
            None => {
                failed += 1;
                errors.push("Missing email".to_string());
                continue;
            }
        };
        let name = match row.name.as_deref().filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => {
                failed += 1;
                errors.push(format!("Missing name for {}", email));
                continue;
            }
        };

        if email_exists(&conn, &email)? {
            failed += 1;
            errors.push(format!("Email {} already exists", email));
            continue;
        }

        let role = row
            .role
            .as_deref()
            .and_then(|r| r.to_uppercase().parse::<Role>().ok())
            .unwrap_or(Role::Aluno);
        let hashed = password::hash(row.password.as_deref().unwrap_or(DEFAULT_IMPORT_PASSWORD))?;

        let id = uuid::Uuid::now_v7().to_string();
        let inserted = conn.execute(
            "INSERT INTO users (id, name, email, password_hash, role, school)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, name, email, hashed, role, row.school],
        );
        match inserted {
            Ok(_) => success += 1,
            Err(e) => {
                tracing::warn!("User import row failed for {}: {}", email, e);
                failed += 1;
                errors.push(format!("Failed to import {}", email));
            }
        }
    }

    Ok(Json(json!({ "success": success, "failed": failed, "errors": errors })).into_response())
}

// --- School management ---

async fn list_schools(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Response> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).max(1);
    let offset = (page - 1) * limit;

    let mut where_sql = String::from(" WHERE role = 'ESCOLA'");
    let mut bind: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        where_sql.push_str(" AND (name LIKE ? OR email LIKE ? OR inep LIKE ?)");
        let pattern = format!("%{}%", search);
        bind.push(Box::new(pattern.clone()));
        bind.push(Box::new(pattern.clone()));
        bind.push(Box::new(pattern));
    }
    if let Some(zone) = query.zone.as_deref().filter(|z| !z.is_empty()) {
        where_sql.push_str(" AND zone = ?");
        bind.push(Box::new(zone.to_uppercase()));
    }

    let conn = state.db.get()?;

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users{}", where_sql),
        rusqlite::params_from_iter(bind.iter()),
        |r| r.get(0),
    )?;

    let sql = format!(
        "SELECT id, name, email, school, role, avatar, inep, zone, address, phone,
                school_type, verified
         FROM users{} ORDER BY name ASC LIMIT {} OFFSET {}",
        where_sql, limit, offset
    );
    let mut stmt = conn.prepare(&sql)?;
    let schools = stmt
        .query_map(rusqlite::params_from_iter(bind.iter()), |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "email": row.get::<_, String>(2)?,
                "school": row.get::<_, Option<String>>(3)?,
                "role": row.get::<_, Role>(4)?,
                "avatar": row.get::<_, Option<String>>(5)?,
                "inep": row.get::<_, Option<String>>(6)?,
                "zone": row.get::<_, Option<String>>(7)?,
                "address": row.get::<_, Option<String>>(8)?,
                "phone": row.get::<_, Option<String>>(9)?,
                "schoolType": row.get::<_, Option<String>>(10)?,
                "verified": row.get::<_, bool>(11)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(json!({
        "schools": schools,
        "totalPages": (total + limit - 1) / limit,
        "currentPage": page,
    }))
    .into_response())
}

async fn create_school(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<CreateSchoolRequest>,
) -> AppResult<Response> {
    if req.name.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation("Missing required fields".into()));
    }

    let conn = state.db.get()?;
    if email_exists(&conn, &req.email)? {
        return Err(AppError::Validation("Email already exists".into()));
    }

    let hashed = password::hash(&req.password)?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role, inep, zone, address, phone,
                            school_type, verified)
         VALUES (?1, ?2, ?3, ?4, 'ESCOLA', ?5, ?6, ?7, ?8, ?9, 1)",
        params![
            id,
            req.name,
            req.email,
            hashed,
            req.inep,
            req.zone.map(|z| z.to_uppercase()),
            req.address,
            req.phone,
            req.school_type.map(|t| t.to_uppercase()),
        ],
    )?;

    let school = sanitized_user(&conn, &id)?;
    Ok((StatusCode::CREATED, Json(school)).into_response())
}

async fn import_schools(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<ImportSchoolsRequest>,
) -> AppResult<Response> {
    let conn = state.db.get()?;

    let mut imported = 0;
    let mut errors: Vec<serde_json::Value> = Vec::new();

    for row in req.schools {
        let (name, email) = match (
            row.name.as_deref().filter(|n| !n.is_empty()),
            row.email.as_deref().filter(|e| !e.is_empty()),
        ) {
            (Some(name), Some(email)) => (name.to_string(), email.to_string()),
            _ => {
                errors.push(json!({ "error": "Missing name or email" }));
                continue;
            }
        };

        if email_exists(&conn, &email)? {
            errors.push(json!({ "email": email, "error": "Email already exists" }));
            continue;
        }

        // INEP codes arrive as strings or bare numbers depending on the
        // spreadsheet that produced the upload.
        let inep = row.inep.map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

        let hashed = password::hash(row.password.as_deref().unwrap_or(DEFAULT_IMPORT_PASSWORD))?;
        let id = uuid::Uuid::now_v7().to_string();
        let inserted = conn.execute(
            "INSERT INTO users (id, name, email, password_hash, role, inep, zone, address, phone,
                                school_type, verified)
             VALUES (?1, ?2, ?3, ?4, 'ESCOLA', ?5, ?6, ?7, ?8, ?9, 1)",
            params![
                id,
                name,
                email,
                hashed,
                inep,
                row.zone.map(|z| z.to_uppercase()),
                row.address,
                row.phone,
                row.school_type.map(|t| t.to_uppercase()),
            ],
        );
        match inserted {
            Ok(_) => imported += 1,
            Err(e) => {
                tracing::warn!("School import row failed for {}: {}", email, e);
                errors.push(json!({ "email": email, "error": "Failed to import" }));
            }
        }
    }

    Ok(Json(json!({
        "message": "Import processed",
        "imported": imported,
        "errors": errors,
    }))
    .into_response())
}

async fn schools_template(_admin: AdminUser) -> Response {
    let csv = "Name,Email,INEP,Zone,SchoolType,Address,Phone,Password\n\
               EMEF Exemplo,contato@exemplo.edu.br,12345678,URBANA,ESCOLA,\"Rua Exemplo, 123\",83999999999,muda1234\n";
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"modelo_importacao_escolas.csv\"".to_string(),
            ),
        ],
        csv,
    )
        .into_response()
}

// --- Reports ---

/// Monthly user/post creation counts for the trailing six months.
async fn growth_report(State(state): State<AppState>, _admin: AdminUser) -> AppResult<Response> {
    let conn = state.db.get()?;

    let users_by_month = count_by_month(&conn, "users")?;
    let posts_by_month = count_by_month(&conn, "posts")?;

    const MONTH_NAMES: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let now = Utc::now();
    let mut data = Vec::with_capacity(6);
    for offset in (0..6).rev() {
        let mut year = now.year();
        let mut month = now.month() as i32 - offset;
        while month < 1 {
            month += 12;
            year -= 1;
        }
        let key = format!("{:04}-{:02}", year, month);
        data.push(json!({
            "name": MONTH_NAMES[(month - 1) as usize],
            "users": users_by_month.get(&key).copied().unwrap_or(0),
            "posts": posts_by_month.get(&key).copied().unwrap_or(0),
        }));
    }

    Ok(Json(data).into_response())
}

// --- Helpers ---

fn email_exists(conn: &Connection, email: &str) -> AppResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![email],
        |r| r.get(0),
    )?;
    Ok(exists)
}

fn sanitized_user(conn: &Connection, id: &str) -> AppResult<serde_json::Value> {
    conn.query_row(
        "SELECT id, name, email, role, school, school_id, school_type, zone, inep, address,
                phone, avatar, verified, created_at
         FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "email": row.get::<_, String>(2)?,
                "role": row.get::<_, Role>(3)?,
                "school": row.get::<_, Option<String>>(4)?,
                "schoolId": row.get::<_, Option<String>>(5)?,
                "schoolType": row.get::<_, Option<String>>(6)?,
                "zone": row.get::<_, Option<String>>(7)?,
                "inep": row.get::<_, Option<String>>(8)?,
                "address": row.get::<_, Option<String>>(9)?,
                "phone": row.get::<_, Option<String>>(10)?,
                "avatar": row.get::<_, Option<String>>(11)?,
                "verified": row.get::<_, bool>(12)?,
                "createdAt": row.get::<_, String>(13)?,
            }))
        },
    )
    .map_err(|_| AppError::NotFound("User not found".into()))
}

fn render_users_csv(rows: &[(String, String, Role, Option<String>, String)]) -> String {
    let mut csv = String::from("Name,Email,Role,School,Created At\n");
    for (name, email, role, school, created_at) in rows {
        let clean_name = name.replace(',', "");
        let clean_school = school.as_deref().unwrap_or("").replace(',', "");
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            clean_name, email, role, clean_school, created_at
        ));
    }
    csv
}

fn count_by_month(conn: &Connection, table: &str) -> AppResult<HashMap<String, i64>> {
    let sql = format!(
        "SELECT substr(created_at, 1, 7), COUNT(*) FROM {} GROUP BY 1",
        table
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut counts = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (month, count) = row?;
        counts.insert(month, count);
    }
    Ok(counts)
}
