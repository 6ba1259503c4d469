//! # 双端口服务装配
//!
//! 管理端口（axum）与代理端口（Pingora）的启动与关闭

use std::path::Path;
use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    app::AppContext,
    config::{AppConfig, ConfigManager},
    error::{Context, Result},
    lerror, linfo, lwarn,
    logging::{LogComponent, LogStage},
    management::ManagementServer,
    proxy::PingoraProxyServer,
};

/// 创建服务器实例
fn create_servers(context: &Arc<AppContext>) -> Result<(ManagementServer, PingoraProxyServer)> {
    let management_server = ManagementServer::new(Arc::clone(context))
        .context("Failed to create management server")?;
    let proxy_server = PingoraProxyServer::new(Arc::clone(context));
    let proxy_address = proxy_server.get_server_address()?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "listen_info",
        "服务监听地址已确定",
        management = %management_server.bind_address(),
        proxy = %proxy_address
    );

    Ok((management_server, proxy_server))
}

/// 处理 Ctrl+C 信号
async fn handle_ctrl_c_signal() -> String {
    match tokio::signal::ctrl_c().await {
        Ok(()) => "Ctrl+C signal".to_string(),
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                "ctrl_c_error",
                &format!("Failed to listen for Ctrl+C: {e:?}")
            );
            "Ctrl+C handler error".to_string()
        }
    }
}

/// 处理服务器任务退出结果
fn handle_task_result(
    server_name: &str,
    result: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> String {
    let operation = server_name.to_lowercase().replace(' ', "_");
    match result {
        Ok(Err(e)) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                &format!("{operation}_error"),
                &format!("{server_name} error: {e:?}")
            );
            format!("{server_name} error")
        }
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                &format!("{operation}_panic"),
                &format!("{server_name} panicked: {e:?}")
            );
            format!("{server_name} panic")
        }
        Ok(Ok(())) => format!("{server_name} exit"),
    }
}

/// 等待关闭信号（Ctrl+C 或服务器退出）
async fn await_shutdown_reason(
    management_task: &mut tokio::task::JoinHandle<Result<()>>,
    proxy_task: &mut tokio::task::JoinHandle<Result<()>>,
) -> String {
    tokio::select! {
        reason = handle_ctrl_c_signal() => reason,
        result = management_task => handle_task_result("Management server", result),
        result = proxy_task => handle_task_result("Proxy server", result),
    }
}

/// 双端口服务器生命周期管理器
///
/// 协调白名单刷新任务、管理服务器和代理服务器的启动与关闭
pub struct DualPortServerManager {
    app_context: Arc<AppContext>,
}

impl DualPortServerManager {
    #[must_use]
    pub const fn new(app_context: Arc<AppContext>) -> Self {
        Self { app_context }
    }

    /// 启动所有组件：白名单刷新任务 → 管理服务器 → 代理服务器
    pub async fn start_all(
        &self,
        management_server: ManagementServer,
        proxy_server: PingoraProxyServer,
    ) -> Result<(
        tokio::task::JoinHandle<Result<()>>,
        tokio::task::JoinHandle<Result<()>>,
    )> {
        self.app_context.refresh_task.start().await?;

        let management_task = tokio::spawn(async move { management_server.serve().await });
        let proxy_task = tokio::spawn(async move { proxy_server.start().await });

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "all_components_started",
            "所有组件已启动"
        );

        Ok((management_task, proxy_task))
    }

    /// 关闭所有组件：停止服务器 → 停止刷新任务
    pub async fn shutdown_all(
        &self,
        management_task: &tokio::task::JoinHandle<Result<()>>,
        proxy_task: &tokio::task::JoinHandle<Result<()>>,
        shutdown_reason: &str,
    ) {
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "shutdown_initiated",
            &format!("开始关闭: {shutdown_reason}")
        );

        management_task.abort();
        proxy_task.abort();

        if let Err(e) = self.app_context.refresh_task.stop().await {
            lwarn!(
                "system",
                LogStage::Shutdown,
                LogComponent::ServerSetup,
                "refresh_task_stop_warning",
                &format!("白名单刷新任务停止异常: {e}")
            );
        }
    }
}

/// 运行双端口服务器
///
/// 1. 加载配置并准备数据库
/// 2. 装配上下文并启动所有组件
/// 3. 等待关闭信号（Ctrl+C 或服务器异常）后关闭
pub async fn run_dual_port_servers(config_path: Option<&Path>) -> Result<()> {
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "start_servers",
        "启动双端口服务"
    );

    let (config, db) = setup_database(config_path).await?;
    let app_context = AppContext::build(config, db)?;

    let (management_server, proxy_server) = create_servers(&app_context)?;
    let server_manager = DualPortServerManager::new(Arc::clone(&app_context));

    let (mut management_task, mut proxy_task) = server_manager
        .start_all(management_server, proxy_server)
        .await?;

    let shutdown_reason = await_shutdown_reason(&mut management_task, &mut proxy_task).await;
    server_manager
        .shutdown_all(&management_task, &proxy_task, &shutdown_reason)
        .await;

    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::ServerSetup,
        "servers_stopped",
        "所有服务已停止"
    );
    Ok(())
}

/// 加载应用配置
fn load_config(config_path: Option<&Path>) -> Result<Arc<AppConfig>> {
    let manager = match config_path {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::new()?,
    };
    Ok(Arc::new(manager.into_config()))
}

/// 加载配置、连接数据库并迁移
async fn setup_database(
    config_path: Option<&Path>,
) -> Result<(Arc<AppConfig>, Arc<DatabaseConnection>)> {
    let config = load_config(config_path)?;
    let db = crate::database::init_database(&config.database)
        .await
        .context("数据库连接失败")?;
    crate::database::run_migrations(&db)
        .await
        .context("数据库迁移失败")?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "database_ready",
        "数据库已就绪"
    );

    Ok((config, Arc::new(db)))
}
