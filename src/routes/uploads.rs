use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(upload_file))
        // Multipart framing overhead on top of the 5MB file cap.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
}

async fn upload_file(
    State(state): State<AppState>,
    _user: CurrentUser,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut stored: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| AppError::Validation("Invalid multipart body".into()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or("").to_string();
        if !content_type.starts_with("image/") {
            return Err(AppError::Validation("Only image files are allowed".into()));
        }

        let ext = extension_for(&content_type, field.file_name());
        let data = field
            .bytes()
            .await
            .map_err(|_| AppError::Validation("File too large".into()))?;
        if data.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation("File too large".into()));
        }

        let filename = format!("file-{}.{}", uuid::Uuid::now_v7(), ext);
        let path = state.config.uploads_path().join(&filename);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        stored = Some(filename);
        break;
    }

    let filename = stored.ok_or_else(|| AppError::Validation("No file uploaded".into()))?;

    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    // The server speaks plain HTTP; a TLS-terminating proxy announces the
    // outer scheme via X-Forwarded-Proto.
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("http");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "File uploaded successfully",
            "url": format!("{scheme}://{host}/uploads/{filename}"),
        })),
    )
        .into_response())
}

/// GET /uploads/{filename}. Serves stored files straight off disk.
pub async fn serve(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<Response> {
    // No nested paths; the stored names are flat uuid-based filenames.
    if filename.contains('/') || filename.contains("..") {
        return Err(AppError::NotFound("File not found".into()));
    }

    let path = state.config.uploads_path().join(&filename);
    let data = tokio::fs::read(&path)
        .await
        .map_err(|_| AppError::NotFound("File not found".into()))?;

    let mime = mime_guess::from_path(&filename).first_or_octet_stream();
    Ok((
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        data,
    )
        .into_response())
}

fn extension_for(content_type: &str, file_name: Option<&str>) -> String {
    if let Some(name) = file_name {
        if let Some((_, ext)) = name.rsplit_once('.') {
            if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
                return ext.to_ascii_lowercase();
            }
        }
    }
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_prefers_the_original_filename() {
        assert_eq!(extension_for("image/png", Some("Foto.JPG")), "jpg");
        assert_eq!(extension_for("image/png", Some("avatar")), "png");
        assert_eq!(extension_for("image/webp", None), "webp");
        assert_eq!(extension_for("image/x-unknown", None), "bin");
    }

}
