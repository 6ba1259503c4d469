//! # Pingora 代理服务器

use std::sync::Arc;

use pingora_core::server::{Server, configuration::Opt};
use pingora_proxy::http_proxy_service;

use super::service::GatewayProxyService;
use crate::app::AppContext;
use crate::error::{ProxyError, Result};
use crate::{
    linfo,
    logging::{LogComponent, LogStage},
};

/// Pingora 代理服务器
pub struct PingoraProxyServer {
    context: Arc<AppContext>,
}

impl PingoraProxyServer {
    /// 创建新的代理服务器
    #[must_use]
    pub const fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// 创建Pingora服务器选项（基本配置）
    fn create_pingora_options() -> Opt {
        Opt {
            daemon: false,   // 在前台运行
            upgrade: false,  // 不支持在线升级
            nocapture: true, // 不捕获标准输出/错误
            ..Opt::default()
        }
    }

    /// 获取代理服务器监听地址
    pub fn get_server_address(&self) -> Result<String> {
        Ok(self.context.config.dual_port.proxy.http.bind_address()?.to_string())
    }

    fn build_service(&self) -> GatewayProxyService {
        GatewayProxyService::new(
            Arc::clone(&self.context.routes),
            self.context.config.upstream.clone(),
            self.context.gateway.clone(),
            self.context.audit.clone(),
        )
    }

    /// 启动服务器，阻塞直到 Pingora 退出
    pub async fn start(self) -> Result<()> {
        let mut server = Server::new(Some(Self::create_pingora_options())).map_err(|e| {
            ProxyError::server_init(format!("Failed to create Pingora server: {e}"))
        })?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "bootstrapping_server",
            "启动Pingora服务器引导"
        );
        server.bootstrap();

        let mut http_service = http_proxy_service(&server.configuration, self.build_service());
        let server_address = self.get_server_address()?;
        http_service.add_tcp(&server_address);
        http_service.threads = Some(self.context.config.dual_port.workers);
        server.add_service(http_service);

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "starting_server",
            "启动Pingora代理服务器",
            address = %server_address,
            workers = self.context.config.dual_port.workers
        );

        let handle = tokio::task::spawn_blocking(move || {
            server.run_forever();
        });

        handle.await.map_err(|e| {
            ProxyError::server_init_with_source("Pingora server task failed", e)
        })
    }
}
