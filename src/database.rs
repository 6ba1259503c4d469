//! # 数据库模块
//!
//! 数据库连接和迁移管理

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use crate::config::DatabaseConfig;
use crate::error::{ProxyError, Result};
use crate::{
    lerror, linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// 初始化数据库连接
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    config.ensure_database_path()?;

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);

    let db = Database::connect(options).await.map_err(|e| {
        ProxyError::database_with_source(format!("数据库连接失败: {}", redact_url(&config.url)), e)
    })?;

    linfo!(
        "system",
        LogStage::Db,
        LogComponent::Database,
        "connected",
        "数据库连接成功",
        url = %redact_url(&config.url)
    );
    Ok(db)
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    linfo!("system", LogStage::Db, LogComponent::Database, "migrate_start", "开始运行数据库迁移");

    if let Err(e) = ::migration::Migrator::up(db, None).await {
        lerror!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "migrate_failed",
            &format!("数据库迁移失败: {e}")
        );
        return Err(ProxyError::database_with_source("数据库迁移失败", e));
    }

    let pending = ::migration::Migrator::get_pending_migrations(db).await?;
    if pending.is_empty() {
        linfo!("system", LogStage::Db, LogComponent::Database, "migrate_done", "数据库迁移完成");
    } else {
        lwarn!(
            "system",
            LogStage::Db,
            LogComponent::Database,
            "migrate_pending",
            &format!("仍有 {} 个待应用的迁移", pending.len())
        );
    }
    Ok(())
}

/// 日志中隐藏连接串里的口令
fn redact_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("***"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
