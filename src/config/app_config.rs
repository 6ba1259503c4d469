//! # 应用配置结构定义

use super::DatabaseConfig;
use super::dual_port_config::DualPortServerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// 白名单刷新间隔下限（秒）
pub const MIN_REFRESH_INTERVAL_SECONDS: u64 = 60;

/// 应用主配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// 双端口服务器配置
    #[serde(default)]
    pub dual_port: DualPortServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 白名单缓存配置
    #[serde(default)]
    pub whitelist: WhitelistConfig,
    /// 上游共享凭证
    pub upstream: UpstreamConfig,
    /// 路由表
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    /// 注册与激活
    #[serde(default)]
    pub registration: RegistrationConfig,
    /// 审计日志
    #[serde(default)]
    pub audit: AuditConfig,
}

/// 白名单缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistConfig {
    /// 刷新间隔（秒），低于 60 时按 60 处理
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
}

const fn default_refresh_interval() -> u64 {
    300
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: default_refresh_interval(),
        }
    }
}

impl WhitelistConfig {
    /// 实际生效的刷新间隔
    #[must_use]
    pub fn effective_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(MIN_REFRESH_INTERVAL_SECONDS))
    }
}

/// 上游服务凭证，所有用户共用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// 上游 API key，以 `Authorization: Bearer` 发送
    pub api_key: String,
    /// 可选的 `OpenAI-Organization`
    #[serde(default)]
    pub organization: Option<String>,
    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// 读取超时（秒）
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
}

const fn default_connect_timeout() -> u64 {
    10
}

const fn default_read_timeout() -> u64 {
    300
}

/// 路由：前缀到上游基础 URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    pub name: String,
    /// 路径前缀，例如 `/v1`
    pub context: String,
    /// 上游基础 URL，例如 `https://api.openai.com`
    pub target: String,
}

/// 注册与激活配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// 允许注册的邮箱域名，空表示不限制
    #[serde(default)]
    pub allowed_email_domains: Vec<String>,
    /// 注册后立即发送激活链接
    #[serde(default)]
    pub direct_email_notify: bool,
    /// 注册后直接激活，不等待激活链接
    #[serde(default)]
    pub auto_activate: bool,
    /// 对外可访问的管理端地址，用于拼接激活链接
    #[serde(default = "default_external_endpoint")]
    pub external_endpoint: String,
    /// 激活通知 webhook，不配置时只写日志
    #[serde(default)]
    pub notify_webhook_url: Option<String>,
}

fn default_external_endpoint() -> String {
    "http://127.0.0.1:9090".to_string()
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            allowed_email_domains: Vec::new(),
            direct_email_notify: false,
            auto_activate: false,
            external_endpoint: default_external_endpoint(),
            notify_webhook_url: None,
        }
    }
}

/// 审计日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 是否记录被拒绝的请求
    #[serde(default)]
    pub record_rejected: bool,
    /// 请求/响应体保存上限（字节）
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

const fn default_true() -> bool {
    true
}

const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            record_rejected: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl AppConfig {
    /// 获取管理端口
    #[must_use]
    pub const fn get_management_port(&self) -> u16 {
        self.dual_port.management.http.port
    }

    /// 获取代理端口
    #[must_use]
    pub const fn get_proxy_port(&self) -> u16 {
        self.dual_port.proxy.http.port
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        self.dual_port.validate()?;

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.upstream.api_key.trim().is_empty() {
            return Err("Upstream api_key cannot be empty".to_string());
        }

        if self.routes.is_empty() {
            return Err("At least one route must be configured".to_string());
        }

        let mut contexts = HashSet::new();
        for route in &self.routes {
            if !route.context.starts_with('/') {
                return Err(format!(
                    "Route '{}' context must start with '/': {}",
                    route.name, route.context
                ));
            }
            if !contexts.insert(route.context.as_str()) {
                return Err(format!("Duplicate route context: {}", route.context));
            }
            let target = Url::parse(&route.target)
                .map_err(|e| format!("Route '{}' has invalid target: {e}", route.name))?;
            if !matches!(target.scheme(), "http" | "https") || target.host_str().is_none() {
                return Err(format!(
                    "Route '{}' target must be an http(s) URL with a host: {}",
                    route.name, route.target
                ));
            }
        }

        Url::parse(&self.registration.external_endpoint)
            .map_err(|e| format!("Invalid registration.external_endpoint: {e}"))?;

        if let Some(webhook) = &self.registration.notify_webhook_url {
            Url::parse(webhook)
                .map_err(|e| format!("Invalid registration.notify_webhook_url: {e}"))?;
        }

        if self.audit.max_body_bytes == 0 {
            return Err("audit.max_body_bytes must be greater than 0".to_string());
        }

        Ok(())
    }
}
