//! # 令牌生命周期集成测试
//!
//! 网关转发完成后的续期、轮换与停用

mod common;

use ally_gateway::proxy::AuthorizedUser;
use ally_gateway::store::{CredentialStore, UserIdentity};
use ally_gateway::token::lifetime_window;
use chrono::{Duration, Utc};
use entity::users;
use pretty_assertions::assert_eq;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

fn identity(email: &str) -> UserIdentity {
    UserIdentity {
        username: "carol".to_string(),
        email: email.to_string(),
        hostname: "desk".to_string(),
        device_info: "fp-002".to_string(),
        password: "secret".to_string(),
    }
}

async fn active_context() -> (std::sync::Arc<ally_gateway::app::AppContext>, AuthorizedUser) {
    let mut config = common::test_config();
    config.registration.auto_activate = true;
    let ctx = common::context_with(config).await;

    let registration = ctx
        .registration
        .register(&identity("carol@example.com"))
        .await
        .unwrap();
    let user = ctx
        .gateway
        .authorize(Some(&registration.access_token.token))
        .await
        .unwrap();
    (ctx, user)
}

#[tokio::test]
async fn test_complete_renews_without_changing_token() {
    let (ctx, user) = active_context().await;

    let returned = ctx.gateway.complete("req-1", &user).await.unwrap();
    assert_eq!(returned, user.token);

    let entry = ctx.whitelist.lookup(&user.token).await.unwrap();
    let remaining = entry.expires_at - Utc::now().naive_utc();
    assert!(remaining > lifetime_window() - Duration::minutes(1));
}

#[tokio::test]
async fn test_complete_rotates_after_lifetime_window() {
    let (ctx, user) = active_context().await;
    common::age_token(&ctx.db, &user.token, lifetime_window() + Duration::hours(1)).await;

    let rotated = ctx.gateway.complete("req-2", &user).await.unwrap();
    assert_ne!(rotated, user.token);

    // 旧令牌立即失效，新令牌立即可用
    assert!(ctx.gateway.authorize(Some(&user.token)).await.is_err());
    let next = ctx.gateway.authorize(Some(&rotated)).await.unwrap();
    assert_eq!(next.user_id, user.user_id);

    // 刷新后依旧如此
    ctx.whitelist.refresh().await.unwrap();
    assert!(ctx.gateway.authorize(Some(&user.token)).await.is_err());
    assert!(ctx.gateway.authorize(Some(&rotated)).await.is_ok());
}

#[tokio::test]
async fn test_deactivated_user_is_dropped() {
    let (ctx, user) = active_context().await;

    assert!(ctx.registration.deactivate(user.user_id).await.unwrap());
    assert!(ctx.gateway.authorize(Some(&user.token)).await.is_err());
    assert!(ctx.gateway.complete("req-3", &user).await.is_none());

    let now = Utc::now().naive_utc();
    assert!(
        ctx.store
            .find_whitelist_entry(&user.token, now)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_whitelist_refresh_picks_up_all_active_users() {
    let mut config = common::test_config();
    config.registration.auto_activate = true;
    let ctx = common::context_with(config).await;

    for email in ["a@example.com", "b@example.com", "c@example.com"] {
        ctx.registration.register(&identity(email)).await.unwrap();
    }

    assert_eq!(ctx.whitelist.refresh().await.unwrap(), 3);
    assert_eq!(ctx.whitelist.len().await, 3);
    assert!(ctx.whitelist.last_refreshed_at().await.is_some());
}

#[tokio::test]
async fn test_expired_user_is_dropped_on_refresh() {
    let (ctx, user) = active_context().await;
    ctx.whitelist.refresh().await.unwrap();
    assert!(ctx.gateway.authorize(Some(&user.token)).await.is_ok());

    // 令牌本身仍在有效期内，只是用户过期
    users::Entity::update_many()
        .col_expr(
            users::Column::ExpiredAt,
            Expr::value(Utc::now().naive_utc() - Duration::minutes(1)),
        )
        .filter(users::Column::Id.eq(user.user_id))
        .exec(&*ctx.db)
        .await
        .unwrap();

    assert_eq!(ctx.whitelist.refresh().await.unwrap(), 0);
    assert!(ctx.whitelist.lookup(&user.token).await.is_none());
    assert!(ctx.gateway.authorize(Some(&user.token)).await.is_err());
}
