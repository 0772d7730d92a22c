mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{body_json, create_post, register_user, send, spawn_app};

#[tokio::test]
async fn created_post_appears_in_the_feed() {
    let app = spawn_app();
    let (token, user_id) = register_user(&app, "Autora", "autora@x.com", "PROFESSOR").await;

    create_post(&app, &token, "Primeira publicação da turma").await;

    let response = send(&app, Method::GET, "/api/posts", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let feed = body_json(response).await;
    let posts = feed.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["content"], "Primeira publicação da turma");
    assert_eq!(posts[0]["author"]["id"], user_id.as_str());
    assert_eq!(posts[0]["likes"], 0);
    assert_eq!(posts[0]["liked"], false);
}

#[tokio::test]
async fn legacy_image_field_feeds_the_images_list() {
    let app = spawn_app();
    let (token, _) = register_user(&app, "Autora", "img@x.com", "ALUNO").await;

    let response = send(
        &app,
        Method::POST,
        "/api/posts",
        Some(&token),
        Some(json!({ "content": "foto", "image": "http://x/uploads/a.png" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let post = body_json(response).await;
    assert_eq!(post["images"], json!(["http://x/uploads/a.png"]));
    // Singular field is derived from the list, never stored separately
    assert_eq!(post["image"], "http://x/uploads/a.png");
}

#[tokio::test]
async fn empty_post_is_rejected() {
    let app = spawn_app();
    let (token, _) = register_user(&app, "Autora", "vazio@x.com", "ALUNO").await;

    let response = send(
        &app,
        Method::POST,
        "/api/posts",
        Some(&token),
        Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn long_posts_are_not_truncated_or_rejected() {
    let app = spawn_app();
    let (token, _) = register_user(&app, "Autora", "longa@x.com", "PROFESSOR").await;

    let content = "a".repeat(20_000);
    let response = send(
        &app,
        Method::POST,
        "/api/posts",
        Some(&token),
        Some(json!({ "content": content })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let post = body_json(response).await;
    assert_eq!(post["content"].as_str().unwrap().len(), 20_000);
}

#[tokio::test]
async fn like_twice_restores_the_original_count() {
    let app = spawn_app();
    let (author, _) = register_user(&app, "Autora", "a@x.com", "PROFESSOR").await;
    let (reader, _) = register_user(&app, "Leitor", "l@x.com", "ALUNO").await;
    let post_id = create_post(&app, &author, "conteúdo").await;

    let uri = format!("/api/posts/{}/like", post_id);

    // Missing type defaults to LIKE
    let response = send(&app, Method::POST, &uri, Some(&reader), Some(json!({}))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["liked"], true);
    assert_eq!(body["type"], "LIKE");

    // Same type again removes the reaction
    let response = send(&app, Method::POST, &uri, Some(&reader), Some(json!({}))).await;
    let body = body_json(response).await;
    assert_eq!(body["liked"], false);

    let response = send(
        &app,
        Method::GET,
        &format!("/api/posts/{}", post_id),
        None,
        None,
    )
    .await;
    let post = body_json(response).await;
    assert_eq!(post["likes"], 0);
}

#[tokio::test]
async fn switching_reaction_type_does_not_double_count() {
    let app = spawn_app();
    let (author, _) = register_user(&app, "Autora", "a2@x.com", "PROFESSOR").await;
    let (reader, _) = register_user(&app, "Leitor", "l2@x.com", "ALUNO").await;
    let post_id = create_post(&app, &author, "conteúdo").await;
    let uri = format!("/api/posts/{}/like", post_id);

    send(&app, Method::POST, &uri, Some(&reader), Some(json!({ "type": "LIKE" }))).await;
    let response = send(
        &app,
        Method::POST,
        &uri,
        Some(&reader),
        Some(json!({ "type": "LOVE" })),
    )
    .await;
    let body = body_json(response).await;
    assert_eq!(body["liked"], true);
    assert_eq!(body["type"], "LOVE");

    let response = send(
        &app,
        Method::GET,
        &format!("/api/posts/{}", post_id),
        Some(&reader),
        None,
    )
    .await;
    let post = body_json(response).await;
    assert_eq!(post["likes"], 1);
    assert_eq!(post["myReaction"], "LOVE");
}

#[tokio::test]
async fn invalid_reaction_type_is_rejected() {
    let app = spawn_app();
    let (token, _) = register_user(&app, "Autora", "a3@x.com", "ALUNO").await;
    let post_id = create_post(&app, &token, "conteúdo").await;

    let response = send(
        &app,
        Method::POST,
        &format!("/api/posts/{}/like", post_id),
        Some(&token),
        Some(json!({ "type": "WOW" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid reaction type");
}

#[tokio::test]
async fn comments_are_embedded_in_post_detail() {
    let app = spawn_app();
    let (author, _) = register_user(&app, "Autora", "a4@x.com", "PROFESSOR").await;
    let (reader, _) = register_user(&app, "Leitor", "l4@x.com", "ALUNO").await;
    let post_id = create_post(&app, &author, "conteúdo").await;

    let response = send(
        &app,
        Method::POST,
        &format!("/api/posts/{}/comments", post_id),
        Some(&reader),
        Some(json!({ "content": "Muito bom!" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let comment = body_json(response).await;
    assert_eq!(comment["content"], "Muito bom!");
    assert_eq!(comment["author"]["name"], "Leitor");

    let response = send(
        &app,
        Method::GET,
        &format!("/api/posts/{}", post_id),
        None,
        None,
    )
    .await;
    let post = body_json(response).await;
    assert_eq!(post["comments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn only_the_author_or_an_admin_can_delete_a_post() {
    let app = spawn_app();
    let (author, _) = register_user(&app, "Autora", "a5@x.com", "ALUNO").await;
    let (other, _) = register_user(&app, "Outro", "o5@x.com", "ALUNO").await;
    let (admin, _) = register_user(&app, "Admin", "adm5@x.com", "ADMIN").await;
    let post_id = create_post(&app, &author, "conteúdo").await;
    let uri = format!("/api/posts/{}", post_id);

    let response = send(&app, Method::DELETE, &uri, Some(&other), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, Method::DELETE, &uri, Some(&admin), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn classroom_scenario_end_to_end() {
    let app = spawn_app();
    let (professor, _) = register_user(&app, "Prof. Ana", "ana@x.com", "PROFESSOR").await;
    let (aluno, _) = register_user(&app, "João", "joao@x.com", "ALUNO").await;

    let post_id = create_post(&app, &professor, "Feira de ciências sexta-feira! #ciencias").await;

    send(
        &app,
        Method::POST,
        &format!("/api/posts/{}/like", post_id),
        Some(&aluno),
        Some(json!({})),
    )
    .await;
    send(
        &app,
        Method::POST,
        &format!("/api/posts/{}/comments", post_id),
        Some(&aluno),
        Some(json!({ "content": "Vou participar!" })),
    )
    .await;

    // The student sees their own reaction reflected in the feed
    let response = send(&app, Method::GET, "/api/posts", Some(&aluno), None).await;
    let feed = body_json(response).await;
    let post = &feed.as_array().unwrap()[0];
    assert_eq!(post["likes"], 1);
    assert_eq!(post["comments"], 1);
    assert_eq!(post["liked"], true);
}
