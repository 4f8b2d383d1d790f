//! Full-router tests: routing, auth middleware, rate limiting, and
//! response envelopes, driven through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use std::sync::Arc;

use ragchat::embeddings::CreateOptions;

use common::{test_app, test_state, test_state_with_model, BrokenStreamModel};

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Like `send`, but returns the raw body text (for SSE responses).
async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(value) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn data_frames(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|payload| payload.to_string())
        .collect()
}

async fn register_user(app: &Router, username: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "password123",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(test_state());
    let (status, body) = send(&app, "GET", "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_register_returns_tokens_and_profile() {
    let app = test_app(test_state());
    let body = register_user(&app, "alice").await;

    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["role"], "user");
    assert!(body["accessToken"].is_string());
    assert!(body["refreshToken"].is_string());
    assert!(body["user"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_register_short_password_is_400() {
    let app = test_app(test_state());
    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "short",
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(body["message"].as_str().unwrap().contains("at least 8"));
}

#[tokio::test]
async fn test_login_wrong_password_is_401() {
    let app = test_app(test_state());
    register_user(&app, "alice").await;

    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({"email": "alice@example.com", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_requires_bearer_token() {
    let app = test_app(test_state());
    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, _) = send(&app, "GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, "GET", "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
}

#[tokio::test]
async fn test_refresh_rotation_over_http() {
    let app = test_app(test_state());
    let registered = register_user(&app, "alice").await;
    let refresh_token = registered["refreshToken"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({"refreshToken": refresh_token})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body["refreshToken"].as_str().unwrap(), refresh_token);

    // Replaying the consumed token fails
    let (status, _) = send(
        &app,
        "POST",
        "/api/auth/refresh",
        None,
        Some(json!({"refreshToken": refresh_token})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_chat_requires_auth() {
    let app = test_app(test_state());
    let (status, _) = send(
        &app,
        "POST",
        "/api/chat/message",
        None,
        Some(json!({"message": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_chat_message_plain() {
    let app = test_app(test_state());
    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat/message",
        Some(token),
        Some(json!({"message": "hello"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["response"], "canned response");
    assert_eq!(body["data"]["useRag"], false);
    assert!(body["data"].get("context").is_none());
}

#[tokio::test]
async fn test_chat_message_with_rag_returns_context() {
    let state = test_state();
    state
        .embeddings
        .create("rust ownership rules", CreateOptions::default())
        .await
        .unwrap();
    let app = test_app(state);

    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat/message",
        Some(token),
        Some(json!({"message": "tell me about rust", "useRag": true})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["useRag"], true);
    let context = body["data"]["context"].as_array().unwrap();
    assert_eq!(context.len(), 1);
    assert_eq!(context[0]["content"], "rust ownership rules");
}

#[tokio::test]
async fn test_stream_forwards_deltas_and_ends_with_done() {
    let app = test_app(test_state());
    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, body) = send_raw(
        &app,
        "POST",
        "/api/chat/message/stream",
        Some(token),
        Some(json!({"message": "hello"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let frames = data_frames(&body);
    assert_eq!(
        frames,
        vec![
            r#"{"delta":"canned "}"#.to_string(),
            r#"{"delta":"response"}"#.to_string(),
            "[DONE]".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_stream_failure_emits_inline_error_without_sentinel() {
    let app = test_app(test_state_with_model(Arc::new(BrokenStreamModel)));
    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, body) = send_raw(
        &app,
        "POST",
        "/api/chat/message/stream",
        Some(token),
        Some(json!({"message": "hello"})),
    )
    .await;

    // Headers are already out when the stream breaks; the failure arrives
    // as one inline error event and the stream closes without [DONE].
    assert_eq!(status, StatusCode::OK);
    let frames = data_frames(&body);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0], r#"{"delta":"partial"}"#);
    let error: Value = serde_json::from_str(&frames[1]).unwrap();
    assert!(error["error"]
        .as_str()
        .unwrap()
        .contains("backend dropped connection"));
    assert!(!frames.contains(&"[DONE]".to_string()));
}

#[tokio::test]
async fn test_empty_chat_message_is_400() {
    let app = test_app(test_state());
    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "POST",
        "/api/chat/message",
        Some(token),
        Some(json!({"message": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_embedding_search_envelope() {
    let app = test_app(test_state());
    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat/embeddings/search",
        Some(token),
        Some(json!({"query": "anything"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["count"], 0);
    assert!(body["data"]["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_models_endpoint() {
    let app = test_app(test_state());
    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, body) = send(&app, "GET", "/api/chat/models", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"]["models"],
        json!(["fake-chat", "fake-embed"])
    );
}

#[tokio::test]
async fn test_create_embedding_endpoint() {
    let app = test_app(test_state());
    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, body) = send(
        &app,
        "POST",
        "/api/chat/embeddings",
        Some(token),
        Some(json!({"content": "rust ownership rules"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["dimensions"], 3);
    assert_eq!(body["data"]["model"], "fake-embed");
}

#[tokio::test]
async fn test_embedding_deactivation_is_admin_only() {
    let state = test_state();
    let record = state
        .embeddings
        .create("rust ownership rules", CreateOptions::default())
        .await
        .unwrap();
    let app = test_app(state);

    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/api/chat/embeddings/{}", record.id),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_change_password_rate_limit() {
    let app = test_app(test_state());
    let registered = register_user(&app, "alice").await;
    let token = registered["accessToken"].as_str().unwrap();

    let attempt = json!({
        "currentPassword": "wrong-password",
        "newPassword": "another-password",
    });

    for _ in 0..5 {
        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/change-password",
            Some(token),
            Some(attempt.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, body) = send(
        &app,
        "POST",
        "/api/auth/change-password",
        Some(token),
        Some(attempt),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["retryAfter"].as_u64().unwrap() >= 1);
}
