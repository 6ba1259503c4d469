//! # 日志配置模块
//!
//! 初始化 tracing 订阅器，并提供带请求 ID、阶段、组件字段的结构化日志宏

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 请求处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    Startup,
    Shutdown,
    Configuration,
    Db,
    Cache,
    BackgroundTask,
    Registration,
    Activation,
    Authentication,
    TokenRotation,
    RequestStart,
    RequestModify,
    UpstreamRequest,
    Response,
    ResponseFailure,
    Audit,
    Error,
}

impl LogStage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Configuration => "configuration",
            Self::Db => "db",
            Self::Cache => "cache",
            Self::BackgroundTask => "background_task",
            Self::Registration => "registration",
            Self::Activation => "activation",
            Self::Authentication => "authentication",
            Self::TokenRotation => "token_rotation",
            Self::RequestStart => "request_start",
            Self::RequestModify => "request_modify",
            Self::UpstreamRequest => "upstream_request",
            Self::Response => "response",
            Self::ResponseFailure => "response_failure",
            Self::Audit => "audit",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    Main,
    ServerSetup,
    Config,
    Database,
    Store,
    Token,
    Registration,
    Notifier,
    Whitelist,
    Scheduler,
    Gateway,
    Proxy,
    Upstream,
    Audit,
    Management,
}

impl LogComponent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::ServerSetup => "server_setup",
            Self::Config => "config",
            Self::Database => "database",
            Self::Store => "store",
            Self::Token => "token",
            Self::Registration => "registration",
            Self::Notifier => "notifier",
            Self::Whitelist => "whitelist",
            Self::Scheduler => "scheduler",
            Self::Gateway => "gateway",
            Self::Proxy => "proxy",
            Self::Upstream => "upstream",
            Self::Audit => "audit",
            Self::Management => "management",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 结构化 info 日志
///
/// `linfo!(request_id, stage, component, operation, message, key = %value, ...)`
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)*)?) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            message = %$message
            $(, $($field)*)?
        )
    };
}

/// 结构化 warn 日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)*)?) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            message = %$message
            $(, $($field)*)?
        )
    };
}

/// 结构化 error 日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)*)?) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            message = %$message
            $(, $($field)*)?
        )
    };
}

/// 结构化 debug 日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(, $($field:tt)*)?) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            message = %$message
            $(, $($field)*)?
        )
    };
}

/// 日志中展示的令牌只保留前缀
#[must_use]
pub fn mask_token(token: &str) -> String {
    const VISIBLE: usize = 8;
    if token.chars().count() <= VISIBLE {
        return "***".to_string();
    }
    let prefix: String = token.chars().take(VISIBLE).collect();
    format!("{prefix}***")
}

/// 默认过滤规则，屏蔽数据库查询明细
#[must_use]
pub fn default_filter(level: &str) -> String {
    format!("{level},ally_gateway=debug,sqlx::query=off,sea_orm::query=warn,sqlx=warn")
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先于命令行给出的级别
pub fn init_optimized_logging(log_level: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter(level));

    let result = tracing_subscriber::registry()
        .with(EnvFilter::try_new(&log_filter).unwrap_or_else(|_| EnvFilter::new(default_filter("info"))))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();

    if result.is_ok() {
        tracing::info!(filter = %log_filter, "logging initialized");
    }
}
