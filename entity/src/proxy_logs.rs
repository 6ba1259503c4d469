//! # 代理审计日志实体定义
//!
//! 每一次经网关转发的请求/响应交换对应一行

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 代理审计日志实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "proxy_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// 被拒绝的请求没有用户
    pub user_id: Option<i32>,
    pub request_id: String,
    pub remote_addr: Option<String>,
    pub request_time: DateTime,
    pub request_method: String,
    pub request_url: String,
    /// JSON 对象
    pub request_headers: String,
    pub request_body: Option<String>,
    pub response_status_code: Option<i32>,
    /// JSON 对象
    pub response_headers: Option<String>,
    pub response_body: Option<String>,
    /// success / failed / rejected
    pub outcome: String,
    pub error_message: Option<String>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "SetNull"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
