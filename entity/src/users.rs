//! # 用户实体定义
//!
//! 注册用户表的 Sea-ORM 实体模型，邮箱唯一

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 用户实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub username: String,
    #[sea_orm(unique)]
    pub email: String,
    pub hostname: String,
    /// 设备指纹
    pub device_info: String,
    /// 按提交原样保存
    #[serde(skip_serializing)]
    pub password: String,
    pub is_activated: bool,
    pub is_verified: bool,
    pub registered_at: DateTime,
    pub activated_at: Option<DateTime>,
    pub expired_at: DateTime,
    pub deactivated_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Model {
    /// 网关可用：已激活、已验证且未过期
    #[must_use]
    pub fn is_usable_at(&self, now: DateTime) -> bool {
        self.is_activated && self.is_verified && now < self.expired_at
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_tokens::Entity")]
    UserTokens,
    #[sea_orm(has_many = "super::proxy_logs::Entity")]
    ProxyLogs,
}

impl Related<super::user_tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserTokens.def()
    }
}

impl Related<super::proxy_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProxyLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
