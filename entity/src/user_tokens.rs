//! # 用户令牌实体定义
//!
//! 激活令牌与访问令牌共用一张表，通过 `token_type` 区分

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 激活令牌类型值
pub const TOKEN_TYPE_ACTIVATION: &str = "activation";
/// 访问令牌类型值
pub const TOKEN_TYPE_ACCESS: &str = "access";

/// 用户令牌实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "user_tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub token_type: String,
    #[sea_orm(unique)]
    pub token: String,
    pub consume_counter: i32,
    pub expires_at: DateTime,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Model {
    /// `created_at <= now <= expires_at`
    #[must_use]
    pub fn is_live_at(&self, now: DateTime) -> bool {
        self.created_at <= now && now <= self.expires_at
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
