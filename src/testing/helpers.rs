//! # 测试辅助函数
//!
//! 内存数据库、临时数据库文件与令牌老化工具

use std::sync::Once;

use chrono::Duration;
use entity::user_tokens;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectOptions, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
};
use sea_orm_migration::MigratorTrait;
use tempfile::TempDir;
use tracing::Level;

static INIT: Once = Once::new();

/// 初始化测试日志
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 创建内存数据库连接
///
/// 每个连接各自持有一个独立的内存库，因此连接池只保留一个连接
pub async fn create_test_db() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    migration::Migrator::up(&db, None).await?;

    Ok(db)
}

/// 创建临时数据库文件
pub async fn create_temp_db() -> Result<(DatabaseConnection, TempDir), DbErr> {
    let temp_dir = tempfile::tempdir()
        .map_err(|e| DbErr::Custom(format!("创建临时目录失败: {e}")))?;

    let db_path = temp_dir.path().join("test.db");
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());

    let db = Database::connect(&db_url).await?;
    migration::Migrator::up(&db, None).await?;

    Ok((db, temp_dir))
}

/// 把令牌的创建时间往前拨，模拟令牌已存在一段时间
pub async fn age_token(db: &DatabaseConnection, token: &str, by: Duration) -> Result<(), DbErr> {
    let model = user_tokens::Entity::find()
        .filter(user_tokens::Column::Token.eq(token))
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(format!("token {token}")))?;

    user_tokens::Entity::update_many()
        .col_expr(user_tokens::Column::CreatedAt, Expr::value(model.created_at - by))
        .filter(user_tokens::Column::Id.eq(model.id))
        .exec(db)
        .await?;
    Ok(())
}

/// 查询令牌行
pub async fn find_token(
    db: &DatabaseConnection,
    token: &str,
) -> Result<Option<user_tokens::Model>, DbErr> {
    user_tokens::Entity::find()
        .filter(user_tokens::Column::Token.eq(token))
        .one(db)
        .await
}

/// 断言错误类型
#[macro_export]
macro_rules! assert_error_type {
    ($result:expr, $error_type:pat) => {
        match $result {
            Err($error_type) => (),
            Err(other) => panic!("Expected error type, got: {:?}", other),
            Ok(val) => panic!("Expected error, got Ok: {:?}", val),
        }
    };
}
