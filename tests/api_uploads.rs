mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{body_json, register_user, send, spawn_app, TestApp};

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

fn multipart_body(field: &str, filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn upload(
    app: &TestApp,
    token: Option<&str>,
    forwarded_proto: Option<&str>,
    body: Vec<u8>,
) -> axum::response::Response {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    if let Some(proto) = forwarded_proto {
        builder = builder.header("x-forwarded-proto", proto);
    }
    let request = builder.body(Body::from(body)).unwrap();

    app.router.clone().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn image_upload_roundtrips_through_the_static_route() {
    let app = spawn_app();
    let (token, _) = register_user(&app, "Autora", "up@x.com", "PROFESSOR").await;

    let data = b"\x89PNG\r\n\x1a\nfake image bytes".to_vec();
    let body = multipart_body("file", "foto.png", "image/png", &data);

    let response = upload(&app, Some(&token), None, body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let result = body_json(response).await;
    assert_eq!(result["message"], "File uploaded successfully");

    let url = result["url"].as_str().unwrap();
    let path_start = url.find("/uploads/").unwrap();
    let path = &url[path_start..];
    assert!(path.starts_with("/uploads/file-"));
    assert!(path.ends_with(".png"));

    // The stored file is served back with the right content type
    let response = send(&app, Method::GET, path, None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(content_type, "image/png");
    let served = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(served.as_ref(), data.as_slice());
}

#[tokio::test]
async fn forwarded_proto_sets_the_url_scheme() {
    let app = spawn_app();
    let (token, _) = register_user(&app, "Autora", "proxy@x.com", "PROFESSOR").await;

    let body = multipart_body("file", "foto.png", "image/png", b"bytes");
    let response = upload(&app, Some(&token), Some("https"), body).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let result = body_json(response).await;
    assert!(result["url"].as_str().unwrap().starts_with("https://"));
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let app = spawn_app();
    let (token, _) = register_user(&app, "Autora", "txt@x.com", "ALUNO").await;

    let body = multipart_body("file", "notas.txt", "text/plain", b"texto");
    let response = upload(&app, Some(&token), None, body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"],
        "Only image files are allowed"
    );
}

#[tokio::test]
async fn oversize_upload_is_rejected() {
    let app = spawn_app();
    let (token, _) = register_user(&app, "Autora", "big@x.com", "ALUNO").await;

    // One byte past the 5MB cap but within the body limit
    let data = vec![0u8; 5 * 1024 * 1024 + 1];
    let body = multipart_body("file", "grande.png", "image/png", &data);
    let response = upload(&app, Some(&token), None, body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "File too large");
}

#[tokio::test]
async fn upload_requires_authentication_and_a_file_field() {
    let app = spawn_app();
    let (token, _) = register_user(&app, "Autora", "auth@x.com", "ALUNO").await;

    let body = multipart_body("file", "foto.png", "image/png", b"bytes");
    let response = upload(&app, None, None, body).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = multipart_body("attachment", "foto.png", "image/png", b"bytes");
    let response = upload(&app, Some(&token), None, body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "No file uploaded");
}

#[tokio::test]
async fn stored_files_outside_the_uploads_dir_are_unreachable() {
    let app = spawn_app();

    // Encoded slash arrives as part of the path parameter
    let response = send(&app, Method::GET, "/uploads/..%2Ftest.db", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, Method::GET, "/uploads/nao-existe.png", None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
