//! # 网关令牌校验
//!
//! 请求进入时只查内存白名单；上游响应后续期或轮换令牌并同步白名单

use std::sync::Arc;

use chrono::Utc;

use crate::error::{AuthError, Result};
use crate::logging::mask_token;
use crate::store::CredentialStore;
use crate::token::TokenLifecycleManager;
use crate::whitelist::WhitelistCache;
use crate::{
    ldebug, lwarn,
    logging::{LogComponent, LogStage},
};

/// 认证通过的请求方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedUser {
    pub user_id: i32,
    /// 请求携带的访问令牌
    pub token: String,
}

/// 网关认证器
#[derive(Clone)]
pub struct AuthGateway {
    whitelist: Arc<WhitelistCache>,
    tokens: TokenLifecycleManager,
    store: Arc<dyn CredentialStore>,
}

impl AuthGateway {
    pub fn new(
        whitelist: Arc<WhitelistCache>,
        tokens: TokenLifecycleManager,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            whitelist,
            tokens,
            store,
        }
    }

    /// 校验请求头中的令牌，不访问数据库
    pub async fn authorize(&self, token: Option<&str>) -> Result<AuthorizedUser> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::TokenMissing)?;

        let now = Utc::now().naive_utc();
        let entry = self
            .whitelist
            .lookup(token)
            .await
            .filter(|entry| !entry.is_expired_at(now))
            .ok_or(AuthError::AccessDenied)?;

        Ok(AuthorizedUser {
            user_id: entry.user_id,
            token: entry.token,
        })
    }

    /// 转发完成后续期或轮换令牌，返回应回写给客户端的令牌
    ///
    /// 续期失败不影响本次响应，只记录日志
    pub async fn complete(&self, request_id: &str, user: &AuthorizedUser) -> Option<String> {
        let refreshed = match self.tokens.refresh_access_token(&user.token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                lwarn!(
                    request_id,
                    LogStage::TokenRotation,
                    LogComponent::Gateway,
                    "refresh_failed",
                    &format!("访问令牌续期失败: {e}"),
                    user_id = user.user_id,
                    token = %mask_token(&user.token)
                );
                return None;
            }
        };

        let now = Utc::now().naive_utc();
        match self.store.find_whitelist_entry(&refreshed.token, now).await {
            Ok(Some(entry)) => {
                self.whitelist
                    .apply_rotation(&user.token, entry, now)
                    .await;
            }
            Ok(None) => {
                // 用户已被停用
                self.whitelist.revoke(&user.token).await;
            }
            Err(e) => {
                lwarn!(
                    request_id,
                    LogStage::TokenRotation,
                    LogComponent::Gateway,
                    "whitelist_sync_failed",
                    &format!("续期后同步白名单失败，等待下次刷新: {e}"),
                    user_id = user.user_id
                );
            }
        }

        ldebug!(
            request_id,
            LogStage::TokenRotation,
            LogComponent::Gateway,
            "token_refreshed",
            "访问令牌已续期",
            user_id = refreshed.user_id,
            rotated = refreshed.rotated
        );
        Some(refreshed.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use crate::store::SeaOrmCredentialStore;
    use crate::testing::{age_token, create_test_db, fixtures::IdentityFixture};
    use crate::token::lifetime_window;
    use sea_orm::DatabaseConnection;

    struct Harness {
        gateway: AuthGateway,
        db: Arc<DatabaseConnection>,
        store: Arc<SeaOrmCredentialStore>,
        whitelist: Arc<WhitelistCache>,
        tokens: TokenLifecycleManager,
    }

    async fn harness() -> Harness {
        let db = Arc::new(create_test_db().await.expect("创建测试数据库失败"));
        let store = Arc::new(SeaOrmCredentialStore::new(Arc::clone(&db)));
        let whitelist = Arc::new(WhitelistCache::new(store.clone()));
        let tokens = TokenLifecycleManager::new(store.clone());
        let gateway = AuthGateway::new(Arc::clone(&whitelist), tokens.clone(), store.clone());
        Harness {
            gateway,
            db,
            store,
            whitelist,
            tokens,
        }
    }

    /// 创建已激活用户并签发访问令牌
    async fn active_user(h: &Harness) -> (i32, String) {
        let now = Utc::now().naive_utc();
        let user = h
            .store
            .upsert_user(&IdentityFixture::new().build(), now)
            .await
            .unwrap();
        h.store
            .activate_user(user.id, now, now + lifetime_window())
            .await
            .unwrap();
        let issued = h.tokens.issue_access_token(user.id).await.unwrap();
        h.whitelist.refresh().await.unwrap();
        (user.id, issued.token)
    }

    #[tokio::test]
    async fn test_missing_and_unknown_tokens_are_rejected() {
        let h = harness().await;

        let err = h.gateway.authorize(None).await.unwrap_err();
        assert!(matches!(err, ProxyError::Auth(AuthError::TokenMissing)));

        let err = h.gateway.authorize(Some("  ")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Auth(AuthError::TokenMissing)));

        let err = h.gateway.authorize(Some("nope")).await.unwrap_err();
        assert!(matches!(err, ProxyError::Auth(AuthError::AccessDenied)));
    }

    #[tokio::test]
    async fn test_authorize_then_renew_keeps_token() {
        let h = harness().await;
        let (user_id, token) = active_user(&h).await;

        let user = h.gateway.authorize(Some(&token)).await.unwrap();
        assert_eq!(user.user_id, user_id);

        let returned = h.gateway.complete("req-1", &user).await;
        assert_eq!(returned.as_deref(), Some(token.as_str()));
        assert!(h.whitelist.is_valid(&token).await);
    }

    #[tokio::test]
    async fn test_aged_token_is_rotated_and_old_one_dropped() {
        let h = harness().await;
        let (_, token) = active_user(&h).await;
        let user = h.gateway.authorize(Some(&token)).await.unwrap();

        age_token(&h.db, &token, lifetime_window() + chrono::Duration::hours(1))
            .await
            .unwrap();

        let rotated = h.gateway.complete("req-2", &user).await.unwrap();
        assert_ne!(rotated, token);
        assert!(h.whitelist.is_valid(&rotated).await);
        assert!(!h.whitelist.is_valid(&token).await);
        assert!(h.gateway.authorize(Some(&token)).await.is_err());
        assert!(h.gateway.authorize(Some(&rotated)).await.is_ok());
    }

    #[tokio::test]
    async fn test_deactivated_user_is_revoked_on_completion() {
        let h = harness().await;
        let (user_id, token) = active_user(&h).await;
        let user = h.gateway.authorize(Some(&token)).await.unwrap();

        h.store
            .deactivate_user(user_id, Utc::now().naive_utc())
            .await
            .unwrap();

        assert!(h.gateway.complete("req-3", &user).await.is_some());
        assert!(!h.whitelist.is_valid(&token).await);
    }
}
