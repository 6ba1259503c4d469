//! # 凭证存储模块
//!
//! 用户、令牌与审计记录的持久化接口，网关其余部分只依赖 `CredentialStore`

mod sea_orm_store;
mod types;

pub use sea_orm_store::SeaOrmCredentialStore;
pub use types::{NewToken, UserIdentity};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use entity::{user_tokens, users};

use crate::audit::AuditRecord;
use crate::error::Result;
use crate::whitelist::WhitelistEntry;

/// 凭证存储
///
/// 每次调用各自保证事务性，调用之间没有跨调用事务
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 按 id 查询用户
    async fn find_user_by_id(&self, user_id: i32) -> Result<Option<users::Model>>;

    /// 按邮箱查询用户
    async fn find_user_by_email(&self, email: &str) -> Result<Option<users::Model>>;

    /// 按邮箱插入或覆盖用户，并重置激活状态
    async fn upsert_user(&self, identity: &UserIdentity, now: NaiveDateTime)
    -> Result<users::Model>;

    /// 标记用户为已激活、已验证
    async fn activate_user(
        &self,
        user_id: i32,
        now: NaiveDateTime,
        expired_at: NaiveDateTime,
    ) -> Result<u64>;

    /// 停用用户
    async fn deactivate_user(&self, user_id: i32, now: NaiveDateTime) -> Result<u64>;

    /// 写入新令牌
    async fn insert_token(&self, token: NewToken) -> Result<user_tokens::Model>;

    /// `created_at <= now <= expires_at` 范围内的令牌
    async fn find_live_token(
        &self,
        token_type: &str,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<Option<user_tokens::Model>>;

    /// 仅当 `consume_counter = 0` 时加一，返回是否由本次调用消费
    async fn consume_token(&self, token_id: i32, now: NaiveDateTime) -> Result<bool>;

    /// 更新令牌过期时间
    async fn set_token_expiry(
        &self,
        token_id: i32,
        expires_at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<()>;

    /// 令用户某类型下所有未过期令牌立即过期
    async fn expire_user_tokens(
        &self,
        user_id: i32,
        token_type: &str,
        now: NaiveDateTime,
    ) -> Result<u64>;

    /// 当前可用的全部访问令牌（用户已激活、已验证、未过期）
    async fn load_whitelist(&self, now: NaiveDateTime) -> Result<Vec<WhitelistEntry>>;

    /// 单个访问令牌的白名单投影
    async fn find_whitelist_entry(
        &self,
        token: &str,
        now: NaiveDateTime,
    ) -> Result<Option<WhitelistEntry>>;

    /// 写入一条审计记录，返回记录 id
    async fn insert_audit_record(&self, record: AuditRecord) -> Result<i32>;
}
