//! # 配置管理模块
//!
//! 处理网关配置的加载、环境变量覆盖与校验

mod app_config;
mod database;
mod dual_port_config;
mod manager;

pub use app_config::{
    AppConfig, AuditConfig, MIN_REFRESH_INTERVAL_SECONDS, RegistrationConfig, RouteConfig,
    UpstreamConfig, WhitelistConfig,
};
pub use database::DatabaseConfig;
pub use dual_port_config::{DualPortServerConfig, ListenerConfig, ManagementPortConfig, ProxyPortConfig};
pub use manager::ConfigManager;
