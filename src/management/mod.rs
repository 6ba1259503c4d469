//! # 管理API模块
//!
//! 注册、激活与健康检查接口

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;

pub use routes::create_routes;
pub use server::{AppState, ManagementServer, build_router};
