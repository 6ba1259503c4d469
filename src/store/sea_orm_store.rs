//! # Sea-ORM 凭证存储实现

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use entity::{proxy_logs, user_tokens, users};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use super::{CredentialStore, NewToken, UserIdentity};
use crate::audit::AuditRecord;
use crate::error::{ProxyError, Result};
use crate::whitelist::WhitelistEntry;
use crate::{
    ldebug,
    logging::{LogComponent, LogStage},
};

/// 基于 Sea-ORM 的凭证存储
#[derive(Debug, Clone)]
pub struct SeaOrmCredentialStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCredentialStore {
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 底层连接
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    fn whitelist_query(now: NaiveDateTime) -> sea_orm::SelectTwo<user_tokens::Entity, users::Entity> {
        user_tokens::Entity::find()
            .find_also_related(users::Entity)
            .filter(user_tokens::Column::TokenType.eq(user_tokens::TOKEN_TYPE_ACCESS))
            .filter(user_tokens::Column::CreatedAt.lte(now))
            .filter(user_tokens::Column::ExpiresAt.gte(now))
            .filter(users::Column::IsActivated.eq(true))
            .filter(users::Column::IsVerified.eq(true))
            .filter(users::Column::ExpiredAt.gt(now))
    }

    fn to_entry(
        (token, user): (user_tokens::Model, Option<users::Model>),
    ) -> Option<WhitelistEntry> {
        user.map(|user| WhitelistEntry {
            user_id: user.id,
            token: token.token,
            expires_at: token.expires_at,
        })
    }
}

#[async_trait]
impl CredentialStore for SeaOrmCredentialStore {
    async fn find_user_by_id(&self, user_id: i32) -> Result<Option<users::Model>> {
        Ok(users::Entity::find_by_id(user_id).one(&*self.db).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        Ok(users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&*self.db)
            .await?)
    }

    async fn upsert_user(
        &self,
        identity: &UserIdentity,
        now: NaiveDateTime,
    ) -> Result<users::Model> {
        let txn = self.db.begin().await?;

        let existing = users::Entity::find()
            .filter(users::Column::Email.eq(identity.email.as_str()))
            .one(&txn)
            .await?;

        let user = if let Some(existing) = existing {
            let mut active: users::ActiveModel = existing.into();
            active.username = Set(identity.username.clone());
            active.hostname = Set(identity.hostname.clone());
            active.device_info = Set(identity.device_info.clone());
            active.password = Set(identity.password.clone());
            active.is_activated = Set(false);
            active.is_verified = Set(false);
            active.registered_at = Set(now);
            active.expired_at = Set(now);
            active.updated_at = Set(now);
            active.update(&txn).await?
        } else {
            users::ActiveModel {
                username: Set(identity.username.clone()),
                email: Set(identity.email.clone()),
                hostname: Set(identity.hostname.clone()),
                device_info: Set(identity.device_info.clone()),
                password: Set(identity.password.clone()),
                is_activated: Set(false),
                is_verified: Set(false),
                registered_at: Set(now),
                activated_at: Set(None),
                expired_at: Set(now),
                deactivated_at: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        };

        txn.commit().await?;
        Ok(user)
    }

    async fn activate_user(
        &self,
        user_id: i32,
        now: NaiveDateTime,
        expired_at: NaiveDateTime,
    ) -> Result<u64> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::IsActivated, Expr::value(true))
            .col_expr(users::Column::IsVerified, Expr::value(true))
            .col_expr(users::Column::ActivatedAt, Expr::value(Some(now)))
            .col_expr(users::Column::ExpiredAt, Expr::value(expired_at))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn deactivate_user(&self, user_id: i32, now: NaiveDateTime) -> Result<u64> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::IsActivated, Expr::value(false))
            .col_expr(users::Column::DeactivatedAt, Expr::value(Some(now)))
            .col_expr(users::Column::ExpiredAt, Expr::value(now))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(user_id))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn insert_token(&self, token: NewToken) -> Result<user_tokens::Model> {
        let model = user_tokens::ActiveModel {
            user_id: Set(token.user_id),
            token_type: Set(token.token_type.to_string()),
            token: Set(token.token),
            consume_counter: Set(0),
            expires_at: Set(token.expires_at),
            created_at: Set(token.created_at),
            updated_at: Set(token.created_at),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(model)
    }

    async fn find_live_token(
        &self,
        token_type: &str,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<Option<user_tokens::Model>> {
        Ok(user_tokens::Entity::find()
            .filter(user_tokens::Column::TokenType.eq(token_type))
            .filter(user_tokens::Column::Token.eq(token))
            .filter(user_tokens::Column::CreatedAt.lte(now))
            .filter(user_tokens::Column::ExpiresAt.gte(now))
            .one(&*self.db)
            .await?)
    }

    async fn consume_token(&self, token_id: i32, now: NaiveDateTime) -> Result<bool> {
        let result = user_tokens::Entity::update_many()
            .col_expr(
                user_tokens::Column::ConsumeCounter,
                Expr::col(user_tokens::Column::ConsumeCounter).add(1),
            )
            .col_expr(user_tokens::Column::UpdatedAt, Expr::value(now))
            .filter(user_tokens::Column::Id.eq(token_id))
            .filter(user_tokens::Column::ConsumeCounter.eq(0))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }

    async fn set_token_expiry(
        &self,
        token_id: i32,
        expires_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<()> {
        let result = user_tokens::Entity::update_many()
            .col_expr(user_tokens::Column::ExpiresAt, Expr::value(expires_at))
            .col_expr(user_tokens::Column::UpdatedAt, Expr::value(now))
            .filter(user_tokens::Column::Id.eq(token_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ProxyError::database(format!("令牌不存在: id={token_id}")));
        }
        Ok(())
    }

    async fn expire_user_tokens(
        &self,
        user_id: i32,
        token_type: &str,
        now: NaiveDateTime,
    ) -> Result<u64> {
        let result = user_tokens::Entity::update_many()
            .col_expr(user_tokens::Column::ExpiresAt, Expr::value(now))
            .col_expr(user_tokens::Column::UpdatedAt, Expr::value(now))
            .filter(user_tokens::Column::UserId.eq(user_id))
            .filter(user_tokens::Column::TokenType.eq(token_type))
            .filter(user_tokens::Column::ExpiresAt.gt(now))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn load_whitelist(&self, now: NaiveDateTime) -> Result<Vec<WhitelistEntry>> {
        let rows = Self::whitelist_query(now).all(&*self.db).await?;
        let entries: Vec<WhitelistEntry> = rows.into_iter().filter_map(Self::to_entry).collect();

        ldebug!(
            "system",
            LogStage::Db,
            LogComponent::Store,
            "load_whitelist",
            &format!("加载白名单 {} 条", entries.len())
        );
        Ok(entries)
    }

    async fn find_whitelist_entry(
        &self,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<Option<WhitelistEntry>> {
        let row = Self::whitelist_query(now)
            .filter(user_tokens::Column::Token.eq(token))
            .one(&*self.db)
            .await?;
        Ok(row.and_then(Self::to_entry))
    }

    async fn insert_audit_record(&self, record: AuditRecord) -> Result<i32> {
        let model = proxy_logs::ActiveModel {
            user_id: Set(record.user_id),
            request_id: Set(record.request_id),
            remote_addr: Set(record.remote_addr),
            request_time: Set(record.request_time),
            request_method: Set(record.method),
            request_url: Set(record.url),
            request_headers: Set(record.request_headers),
            request_body: Set(record.request_body),
            response_status_code: Set(record.response_status.map(i32::from)),
            response_headers: Set(record.response_headers),
            response_body: Set(record.response_body),
            outcome: Set(record.outcome.as_str().to_string()),
            error_message: Set(record.error_message),
            created_at: Set(record.created_at),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;
        Ok(model.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{create_test_db, fixtures::IdentityFixture};
    use chrono::{Duration, Utc};

    async fn store() -> SeaOrmCredentialStore {
        let db = create_test_db().await.expect("创建测试数据库失败");
        SeaOrmCredentialStore::new(Arc::new(db))
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    #[tokio::test]
    async fn test_upsert_reuses_row_by_email() {
        let store = store().await;
        let identity = IdentityFixture::new().email("a@b.com").build();

        let first = store.upsert_user(&identity, now()).await.unwrap();
        store
            .activate_user(first.id, now(), now() + Duration::days(31))
            .await
            .unwrap();

        let again = IdentityFixture::new()
            .email("a@b.com")
            .username("renamed")
            .build();
        let second = store.upsert_user(&again, now()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.username, "renamed");
        assert!(!second.is_activated);
        assert!(!second.is_verified);
    }

    #[tokio::test]
    async fn test_consume_token_only_once() {
        let store = store().await;
        let user = store
            .upsert_user(&IdentityFixture::new().build(), now())
            .await
            .unwrap();
        let token = store
            .insert_token(NewToken {
                user_id: user.id,
                token_type: user_tokens::TOKEN_TYPE_ACTIVATION,
                token: "act-1".to_string(),
                created_at: now(),
                expires_at: now() + Duration::days(1),
            })
            .await
            .unwrap();

        assert!(store.consume_token(token.id, now()).await.unwrap());
        assert!(!store.consume_token(token.id, now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_whitelist_requires_activated_user() {
        let store = store().await;
        let user = store
            .upsert_user(&IdentityFixture::new().build(), now())
            .await
            .unwrap();
        store
            .insert_token(NewToken {
                user_id: user.id,
                token_type: user_tokens::TOKEN_TYPE_ACCESS,
                token: "acc-1".to_string(),
                created_at: now(),
                expires_at: now() + Duration::days(31),
            })
            .await
            .unwrap();

        assert!(store.load_whitelist(now()).await.unwrap().is_empty());

        store
            .activate_user(user.id, now(), now() + Duration::days(31))
            .await
            .unwrap();
        let entries = store.load_whitelist(now()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].user_id, user.id);
        assert_eq!(entries[0].token, "acc-1");

        let single = store.find_whitelist_entry("acc-1", now()).await.unwrap();
        assert_eq!(single.map(|e| e.user_id), Some(user.id));
    }

    #[tokio::test]
    async fn test_expire_user_tokens() {
        let store = store().await;
        let user = store
            .upsert_user(&IdentityFixture::new().build(), now())
            .await
            .unwrap();
        for value in ["acc-a", "acc-b"] {
            store
                .insert_token(NewToken {
                    user_id: user.id,
                    token_type: user_tokens::TOKEN_TYPE_ACCESS,
                    token: value.to_string(),
                    created_at: now() - Duration::seconds(5),
                    expires_at: now() + Duration::days(31),
                })
                .await
                .unwrap();
        }

        let expired = store
            .expire_user_tokens(user.id, user_tokens::TOKEN_TYPE_ACCESS, now())
            .await
            .unwrap();
        assert_eq!(expired, 2);

        let later = now() + Duration::seconds(1);
        let live = store
            .find_live_token(user_tokens::TOKEN_TYPE_ACCESS, "acc-a", later)
            .await
            .unwrap();
        assert!(live.is_none());
    }
}
