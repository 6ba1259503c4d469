//! # 令牌生命周期管理器

use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use entity::user_tokens::{self, TOKEN_TYPE_ACCESS, TOKEN_TYPE_ACTIVATION};
use serde::Serialize;
use uuid::Uuid;

use super::lifetime_window;
use crate::error::{ProxyError, Result};
use crate::logging::mask_token;
use crate::store::{CredentialStore, NewToken};
use crate::{
    ldebug, linfo,
    logging::{LogComponent, LogStage},
};

/// 新签发的令牌
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub user_id: i32,
    pub token: String,
    pub expires_at: NaiveDateTime,
}

impl From<user_tokens::Model> for IssuedToken {
    fn from(model: user_tokens::Model) -> Self {
        Self {
            user_id: model.user_id,
            token: model.token,
            expires_at: model.expires_at,
        }
    }
}

/// 访问令牌续期结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRefresh {
    pub user_id: i32,
    /// 当前有效的令牌值，轮换时与请求中的不同
    pub token: String,
    pub expires_at: NaiveDateTime,
    pub rotated: bool,
}

/// 令牌生命周期管理器
#[derive(Clone)]
pub struct TokenLifecycleManager {
    store: Arc<dyn CredentialStore>,
}

impl TokenLifecycleManager {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// 签发激活令牌
    pub async fn issue_activation_token(&self, user_id: i32) -> Result<IssuedToken> {
        self.issue(user_id, TOKEN_TYPE_ACTIVATION, Utc::now().naive_utc())
            .await
    }

    /// 签发访问令牌
    pub async fn issue_access_token(&self, user_id: i32) -> Result<IssuedToken> {
        self.issue(user_id, TOKEN_TYPE_ACCESS, Utc::now().naive_utc())
            .await
    }

    /// 查找未消费的有效激活令牌，不消费
    pub async fn find_activation_token(&self, token: &str) -> Result<user_tokens::Model> {
        let now = Utc::now().naive_utc();
        self.store
            .find_live_token(TOKEN_TYPE_ACTIVATION, token, now)
            .await?
            .filter(|model| model.consume_counter == 0)
            .ok_or_else(|| ProxyError::invalid_token("激活令牌不存在、已过期或已使用"))
    }

    /// 消费激活令牌
    ///
    /// 并发兑换时只有一个调用能消费成功，其余返回令牌已使用
    pub async fn consume_activation_token(&self, model: &user_tokens::Model) -> Result<()> {
        let now = Utc::now().naive_utc();
        if !self.store.consume_token(model.id, now).await? {
            return Err(ProxyError::invalid_token("激活令牌已使用"));
        }

        linfo!(
            "system",
            LogStage::Activation,
            LogComponent::Token,
            "activation_redeemed",
            "激活令牌已兑换",
            user_id = model.user_id,
            token = %mask_token(&model.token)
        );
        Ok(())
    }

    /// 续期或轮换访问令牌
    pub async fn refresh_access_token(&self, token: &str) -> Result<TokenRefresh> {
        self.refresh_access_token_at(token, Utc::now().naive_utc())
            .await
    }

    /// 以指定时间点续期或轮换访问令牌
    pub async fn refresh_access_token_at(
        &self,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<TokenRefresh> {
        let current = self
            .store
            .find_live_token(TOKEN_TYPE_ACCESS, token, now)
            .await?
            .ok_or_else(|| ProxyError::invalid_token("访问令牌不存在或已过期"))?;

        let window = lifetime_window();
        if current.created_at + window < now {
            self.store.set_token_expiry(current.id, now, now).await?;
            let issued = self.issue(current.user_id, TOKEN_TYPE_ACCESS, now).await?;

            linfo!(
                "system",
                LogStage::TokenRotation,
                LogComponent::Token,
                "access_token_rotated",
                "访问令牌已超过最长生命周期，已轮换",
                user_id = current.user_id,
                old = %mask_token(token),
                new = %mask_token(&issued.token)
            );
            return Ok(TokenRefresh {
                user_id: issued.user_id,
                token: issued.token,
                expires_at: issued.expires_at,
                rotated: true,
            });
        }

        let expires_at = now + window;
        self.store
            .set_token_expiry(current.id, expires_at, now)
            .await?;

        ldebug!(
            "system",
            LogStage::TokenRotation,
            LogComponent::Token,
            "access_token_renewed",
            "访问令牌已续期",
            user_id = current.user_id,
            token = %mask_token(token)
        );
        Ok(TokenRefresh {
            user_id: current.user_id,
            token: current.token,
            expires_at,
            rotated: false,
        })
    }

    /// 有效访问令牌所属的用户 id
    pub async fn user_id_by_access_token(&self, token: &str) -> Result<Option<i32>> {
        let now = Utc::now().naive_utc();
        Ok(self
            .store
            .find_live_token(TOKEN_TYPE_ACCESS, token, now)
            .await?
            .map(|model| model.user_id))
    }

    async fn issue(
        &self,
        user_id: i32,
        token_type: &'static str,
        now: NaiveDateTime,
    ) -> Result<IssuedToken> {
        let model = self
            .store
            .insert_token(NewToken {
                user_id,
                token_type,
                token: Uuid::new_v4().to_string(),
                created_at: now,
                expires_at: now + lifetime_window(),
            })
            .await?;

        ldebug!(
            "system",
            LogStage::Registration,
            LogComponent::Token,
            "token_issued",
            &format!("已签发 {token_type} 令牌"),
            user_id = user_id,
            token = %mask_token(&model.token)
        );
        Ok(model.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::store::SeaOrmCredentialStore;
    use crate::testing::{age_token, create_test_db, find_token, fixtures::IdentityFixture};
    use chrono::Duration;
    use sea_orm::DatabaseConnection;

    async fn setup() -> (TokenLifecycleManager, Arc<DatabaseConnection>, i32) {
        let db = Arc::new(create_test_db().await.expect("创建测试数据库失败"));
        let store = Arc::new(SeaOrmCredentialStore::new(Arc::clone(&db)));
        let user = store
            .upsert_user(&IdentityFixture::new().build(), Utc::now().naive_utc())
            .await
            .unwrap();
        (TokenLifecycleManager::new(store), db, user.id)
    }

    fn is_invalid_token(err: &ProxyError) -> bool {
        matches!(err.root(), ProxyError::Auth(AuthError::InvalidOrExpiredToken(_)))
    }

    #[tokio::test]
    async fn test_issued_tokens_expire_after_window() {
        let (manager, _db, user_id) = setup().await;
        let before = Utc::now().naive_utc();

        let activation = manager.issue_activation_token(user_id).await.unwrap();
        let access = manager.issue_access_token(user_id).await.unwrap();

        assert_ne!(activation.token, access.token);
        assert!(Uuid::parse_str(&access.token).is_ok());
        assert!(access.expires_at >= before + lifetime_window());
        assert!(access.expires_at <= Utc::now().naive_utc() + lifetime_window());
    }

    #[tokio::test]
    async fn test_activation_token_redeems_once() {
        let (manager, _db, user_id) = setup().await;
        let activation = manager.issue_activation_token(user_id).await.unwrap();

        // 查找不消费
        let found = manager
            .find_activation_token(&activation.token)
            .await
            .unwrap();
        let again = manager
            .find_activation_token(&activation.token)
            .await
            .unwrap();
        assert_eq!(found.user_id, user_id);
        assert_eq!(found.id, again.id);

        manager.consume_activation_token(&found).await.unwrap();
        let err = manager.consume_activation_token(&again).await.unwrap_err();
        assert!(is_invalid_token(&err));
        let err = manager
            .find_activation_token(&activation.token)
            .await
            .unwrap_err();
        assert!(is_invalid_token(&err));
    }

    #[tokio::test]
    async fn test_access_token_cannot_redeem_activation() {
        let (manager, _db, user_id) = setup().await;
        let access = manager.issue_access_token(user_id).await.unwrap();

        let err = manager
            .find_activation_token(&access.token)
            .await
            .unwrap_err();
        assert!(is_invalid_token(&err));
    }

    #[tokio::test]
    async fn test_renewal_keeps_value_and_extends_expiry() {
        let (manager, _db, user_id) = setup().await;
        let access = manager.issue_access_token(user_id).await.unwrap();

        let first = manager.refresh_access_token(&access.token).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = manager.refresh_access_token(&access.token).await.unwrap();

        assert!(!first.rotated);
        assert!(!second.rotated);
        assert_eq!(first.token, access.token);
        assert_eq!(second.token, access.token);
        assert!(second.expires_at > first.expires_at);
    }

    #[tokio::test]
    async fn test_rotation_after_absolute_lifetime() {
        let (manager, db, user_id) = setup().await;
        let access = manager.issue_access_token(user_id).await.unwrap();
        age_token(&db, &access.token, lifetime_window() + Duration::minutes(1))
            .await
            .unwrap();

        let refreshed = manager.refresh_access_token(&access.token).await.unwrap();
        assert!(refreshed.rotated);
        assert_ne!(refreshed.token, access.token);
        assert_eq!(refreshed.user_id, user_id);

        let old = find_token(&db, &access.token).await.unwrap().unwrap();
        assert!(old.expires_at <= Utc::now().naive_utc());

        // 旧令牌之后无法再续期
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let err = manager
            .refresh_access_token(&access.token)
            .await
            .unwrap_err();
        assert!(is_invalid_token(&err));

        assert_eq!(
            manager
                .user_id_by_access_token(&refreshed.token)
                .await
                .unwrap(),
            Some(user_id)
        );
    }

    #[tokio::test]
    async fn test_expiry_never_exceeds_window_from_refresh_time() {
        let (manager, _db, user_id) = setup().await;
        let access = manager.issue_access_token(user_id).await.unwrap();
        let now = Utc::now().naive_utc() + Duration::days(3);

        let refreshed = manager
            .refresh_access_token_at(&access.token, now)
            .await
            .unwrap();
        assert_eq!(refreshed.expires_at, now + lifetime_window());
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let (manager, _db, _) = setup().await;
        let err = manager.refresh_access_token("missing").await.unwrap_err();
        assert!(is_invalid_token(&err));
        assert_eq!(manager.user_id_by_access_token("missing").await.unwrap(), None);
    }
}
