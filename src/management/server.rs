//! # 管理服务器
//!
//! Axum HTTP服务器，提供注册、激活与健康检查

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;

use axum::Router;
use axum::http::{Method, header};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::middleware::request_id_middleware;
use crate::app::AppContext;
use crate::error::{ProxyError, Result};
use crate::{
    linfo,
    logging::{LogComponent, LogStage},
};

/// 管理服务器应用状态
#[derive(Clone)]
pub struct AppState {
    context: Arc<AppContext>,
}

impl AppState {
    #[must_use]
    pub const fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    #[must_use]
    pub const fn context_arc(&self) -> &Arc<AppContext> {
        &self.context
    }
}

impl Deref for AppState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

/// 管理服务器
pub struct ManagementServer {
    bind_address: SocketAddr,
    router: Router,
}

impl ManagementServer {
    /// 创建新的管理服务器
    pub fn new(context: Arc<AppContext>) -> Result<Self> {
        let bind_address = context.config.dual_port.management.http.bind_address()?;
        Ok(Self {
            bind_address,
            router: build_router(context),
        })
    }

    /// 获取绑定地址
    #[must_use]
    pub const fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// 启动服务器
    pub async fn serve(self) -> Result<()> {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::ServerSetup,
            "server_start",
            &format!("Starting management server on {}", self.bind_address)
        );

        let listener = TcpListener::bind(&self.bind_address).await?;

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| ProxyError::server_init_with_source("Management server error", e))?;

        Ok(())
    }
}

/// 带中间件的完整路由
pub fn build_router(context: Arc<AppContext>) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
        .allow_origin(Any);

    super::routes::create_routes(AppState::new(context))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
}
