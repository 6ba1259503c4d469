//! # 审计日志集成测试
//!
//! 代理上下文生成的记录写入 `proxy_logs`

mod common;

use std::io::Write;

use ally_gateway::audit::AuditOutcome;
use ally_gateway::error::AuthError;
use ally_gateway::proxy::{AuthorizedUser, ProxyContext};
use ally_gateway::store::UserIdentity;
use entity::proxy_logs;
use flate2::Compression;
use flate2::write::GzEncoder;
use pretty_assertions::assert_eq;
use sea_orm::EntityTrait;

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_successful_exchange_is_persisted_decoded() {
    let ctx = common::test_context().await;
    let registration = ctx
        .registration
        .register(&UserIdentity {
            username: "dave".to_string(),
            email: "dave@example.com".to_string(),
            hostname: String::new(),
            device_info: String::new(),
            password: "secret".to_string(),
        })
        .await
        .unwrap();
    let user_id = registration.user.id;

    let mut exchange = ProxyContext::new("req-audit-1".to_string(), ctx.audit.max_body_bytes());
    exchange.method = "POST".to_string();
    exchange.url = "/v1/chat/completions".to_string();
    exchange.remote_addr = Some("10.0.0.7:51234".to_string());
    exchange.user = Some(AuthorizedUser {
        user_id,
        token: registration.access_token.token.clone(),
    });
    exchange.request_headers = r#"{"content-type":"application/json"}"#.to_string();
    exchange.add_request_chunk(br#"{"model":"gpt-4o"}"#);
    exchange.response_status = Some(200);
    exchange.response_encoding = Some("gzip".to_string());
    exchange.add_response_chunk(&gzip(br#"{"id":"chatcmpl-1"}"#));

    let outcome = exchange.outcome(false).unwrap();
    assert_eq!(outcome, AuditOutcome::Success);
    let id = ctx
        .audit
        .record(exchange.to_audit_record(outcome, None))
        .await
        .unwrap()
        .unwrap();

    let row = proxy_logs::Entity::find_by_id(id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.user_id, Some(user_id));
    assert_eq!(row.request_method, "POST");
    assert_eq!(row.request_url, "/v1/chat/completions");
    assert_eq!(row.request_body.as_deref(), Some(r#"{"model":"gpt-4o"}"#));
    assert_eq!(row.response_status_code, Some(200));
    assert_eq!(row.response_body.as_deref(), Some(r#"{"id":"chatcmpl-1"}"#));
    assert_eq!(row.outcome, "success");
    assert!(row.error_message.is_none());
}

#[tokio::test]
async fn test_rejections_follow_configuration() {
    let ctx = common::test_context().await;

    let mut rejected = ProxyContext::new("req-audit-2".to_string(), 1024);
    rejected.rejection = Some(AuthError::AccessDenied);
    rejected.response_status = Some(401);
    let outcome = rejected.outcome(false).unwrap();
    assert_eq!(outcome, AuditOutcome::Rejected);

    // 默认不记录被拒绝的请求
    let saved = ctx
        .audit
        .record(rejected.to_audit_record(outcome, None))
        .await
        .unwrap();
    assert!(saved.is_none());

    let mut config = common::test_config();
    config.audit.record_rejected = true;
    let ctx = common::context_with(config).await;
    let id = ctx
        .audit
        .record(rejected.to_audit_record(outcome, None))
        .await
        .unwrap()
        .unwrap();

    let row = proxy_logs::Entity::find_by_id(id)
        .one(ctx.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.outcome, "rejected");
    assert!(row.user_id.is_none());
    assert!(row.error_message.is_some());
}

#[tokio::test]
async fn test_unrouted_requests_are_not_audited() {
    let exchange = ProxyContext::new("req-audit-3".to_string(), 1024);
    assert!(exchange.outcome(false).is_none());
}
