//! # 注册激活流程集成测试
//!
//! 经由管理端路由完成注册、激活，再由网关放行

mod common;

use ally_gateway::error::{AuthError, ProxyError};
use ally_gateway::management::build_router;
use ally_gateway::store::CredentialStore;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use entity::user_tokens::TOKEN_TYPE_ACTIVATION;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn register_request(body: &Value) -> Request<Body> {
    Request::post("/user/register/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn identity(email: &str) -> Value {
    json!({
        "username": "alice",
        "email": email,
        "hostname": "laptop",
        "device_info": "fp-001",
        "password": "secret"
    })
}

#[tokio::test]
async fn test_register_activate_then_gateway_admits() {
    let ctx = common::test_context().await;
    let app = build_router(ctx.clone());

    let response = app
        .clone()
        .oneshot(register_request(&identity("alice@example.com")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["activated"], false);
    let access_token = body["data"]["access_token"].as_str().unwrap().to_string();

    // 未激活前网关拒绝
    ctx.whitelist.refresh().await.unwrap();
    let denied = ctx.gateway.authorize(Some(&access_token)).await.unwrap_err();
    assert!(matches!(denied, ProxyError::Auth(AuthError::AccessDenied)));

    let user = ctx
        .store
        .find_user_by_email("alice@example.com")
        .await
        .unwrap()
        .unwrap();
    let activation_token = common::latest_token(&ctx.db, user.id, TOKEN_TYPE_ACTIVATION).await;

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/user/activate/{activation_token}"))
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["already_active"], false);

    // 激活后需等待下一次刷新
    assert!(ctx.gateway.authorize(Some(&access_token)).await.is_err());
    ctx.whitelist.refresh().await.unwrap();
    let admitted = ctx.gateway.authorize(Some(&access_token)).await.unwrap();
    assert_eq!(admitted.user_id, user.id);

    // 激活令牌只能使用一次
    let response = app
        .oneshot(
            Request::get(format!("/user/activate/{activation_token}"))
                .header(header::ACCEPT, "application/json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], 1002);
}

#[tokio::test]
async fn test_activation_page_for_browsers() {
    let ctx = common::test_context().await;
    let response = build_router(ctx)
        .oneshot(
            Request::get("/user/activate/not-a-token")
                .header(header::ACCEPT, "text/html")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"));
}

#[tokio::test]
async fn test_reregister_invalidates_previous_access_token() {
    let mut config = common::test_config();
    config.registration.auto_activate = true;
    let ctx = common::context_with(config).await;
    let app = build_router(ctx.clone());

    let first = json_body(
        app.clone()
            .oneshot(register_request(&identity("bob@example.com")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first["data"]["activated"], true);
    let first_token = first["data"]["access_token"].as_str().unwrap().to_string();
    assert!(ctx.gateway.authorize(Some(&first_token)).await.is_ok());

    let second = json_body(
        app.oneshot(register_request(&identity("bob@example.com")))
            .await
            .unwrap(),
    )
    .await;
    let second_token = second["data"]["access_token"].as_str().unwrap().to_string();
    assert_ne!(first_token, second_token);

    assert!(ctx.gateway.authorize(Some(&first_token)).await.is_err());
    assert!(ctx.gateway.authorize(Some(&second_token)).await.is_ok());
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let mut config = common::test_config();
    config.registration.allowed_email_domains = vec!["corp.example".to_string()];
    let app = build_router(common::context_with(config).await);

    let response = app
        .clone()
        .oneshot(register_request(&identity("mallory@elsewhere.com")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], 1007);

    let response = app
        .oneshot(register_request(&json!({ "username": "no-email" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], 1000);
}
