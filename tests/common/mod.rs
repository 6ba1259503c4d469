//! # 集成测试公共工具
//!
//! 内存数据库上装配完整的应用上下文

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use ally_gateway::app::AppContext;
use ally_gateway::config::{AppConfig, ConfigManager};
use ally_gateway::database::{init_database, run_migrations};
use chrono::Duration;
use entity::user_tokens;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

pub const TEST_CONFIG: &str = r#"
[database]
url = "sqlite::memory:"
max_connections = 1

[upstream]
api_key = "sk-upstream-test"

[[routes]]
name = "openai"
context = "/v1"
target = "http://127.0.0.1:9"
"#;

pub fn test_config() -> AppConfig {
    ConfigManager::from_toml_str(TEST_CONFIG, HashMap::new())
        .expect("测试配置应合法")
        .into_config()
}

/// 以给定配置装配上下文
pub async fn context_with(config: AppConfig) -> Arc<AppContext> {
    let db = init_database(&config.database)
        .await
        .expect("数据库连接失败");
    run_migrations(&db).await.expect("数据库迁移失败");
    AppContext::build(Arc::new(config), Arc::new(db)).expect("装配上下文失败")
}

pub async fn test_context() -> Arc<AppContext> {
    context_with(test_config()).await
}

/// 用户最新签发的某类令牌
pub async fn latest_token(db: &DatabaseConnection, user_id: i32, token_type: &str) -> String {
    user_tokens::Entity::find()
        .filter(user_tokens::Column::UserId.eq(user_id))
        .filter(user_tokens::Column::TokenType.eq(token_type))
        .order_by_desc(user_tokens::Column::Id)
        .one(db)
        .await
        .expect("查询令牌失败")
        .expect("令牌不存在")
        .token
}

/// 把令牌的创建时间往前拨
pub async fn age_token(db: &DatabaseConnection, token: &str, by: Duration) {
    let model = user_tokens::Entity::find()
        .filter(user_tokens::Column::Token.eq(token))
        .one(db)
        .await
        .expect("查询令牌失败")
        .expect("令牌不存在");

    user_tokens::Entity::update_many()
        .col_expr(user_tokens::Column::CreatedAt, Expr::value(model.created_at - by))
        .filter(user_tokens::Column::Id.eq(model.id))
        .exec(db)
        .await
        .expect("更新令牌失败");
}
