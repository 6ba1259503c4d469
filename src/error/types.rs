//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

use super::{AuthError, ErrorCategory};

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 配置相关错误
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 凭证存储不可用或查询失败
    #[error("数据库错误: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 请求参数校验失败
    #[error("参数错误: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// 认证和令牌错误
    #[error("认证错误: {0}")]
    Auth(#[from] AuthError),

    /// 上游不可达或返回错误
    #[error("网关错误: {message}")]
    BadGateway {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 激活通知发送失败
    #[error("通知错误: {message}")]
    Notification {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 服务器初始化错误
    #[error("服务器初始化错误: {message}")]
    ServerInit {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// IO相关错误
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// 附加了上下文信息的错误
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProxyError>,
    },
}

impl ProxyError {
    /// 转换为 HTTP 状态码与错误码
    #[must_use]
    pub fn to_http_response_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Self::Database { .. } => (StatusCode::SERVICE_UNAVAILABLE, "DATABASE_ERROR"),
            Self::Validation { .. } => (StatusCode::BAD_REQUEST, "INVALID_PARAMETERS"),
            Self::Auth(AuthError::InvalidOrExpiredToken(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_TOKEN")
            }
            Self::Auth(err) => (StatusCode::UNAUTHORIZED, err.code()),
            Self::BadGateway { .. } => (StatusCode::BAD_GATEWAY, "BAD_GATEWAY_ERROR"),
            Self::Notification { .. } => (StatusCode::BAD_GATEWAY, "NOTIFICATION_ERROR"),
            Self::ServerInit { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "SERVER_INIT_ERROR"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::Serialization { .. } => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            Self::Context { source, .. } => source.to_http_response_parts(),
        }
    }

    /// 错误归属
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        if self.to_http_response_parts().0.is_client_error() {
            ErrorCategory::Client
        } else {
            ErrorCategory::Server
        }
    }

    /// 去掉上下文包装后的根错误
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建数据库错误
    pub fn database<T: Into<String>>(message: T) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的数据库错误
    pub fn database_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建参数校验错误
    pub fn validation<T: Into<String>>(message: T, field: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// 令牌无效或已过期
    pub fn invalid_token<T: Into<String>>(message: T) -> Self {
        Self::Auth(AuthError::InvalidOrExpiredToken(message.into()))
    }

    /// 创建网关错误
    pub fn bad_gateway<T: Into<String>>(message: T) -> Self {
        Self::BadGateway {
            message: message.into(),
            source: None,
        }
    }

    /// 创建通知错误
    pub fn notification<T: Into<String>>(message: T) -> Self {
        Self::Notification {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的通知错误
    pub fn notification_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Notification {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建服务器初始化错误
    pub fn server_init<T: Into<String>>(message: T) -> Self {
        Self::ServerInit {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的服务器初始化错误
    pub fn server_init_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::ServerInit {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建内部错误
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的内部错误
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for ProxyError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML解析失败", err)
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
            source: err.into(),
        }
    }
}

impl From<sea_orm::DbErr> for ProxyError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::database_with_source(err.to_string(), err)
    }
}

impl From<url::ParseError> for ProxyError {
    fn from(err: url::ParseError) -> Self {
        Self::config_with_source(format!("URL解析失败: {err}"), err)
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        Self::notification_with_source(err.to_string(), err)
    }
}

impl From<Box<pingora_core::Error>> for ProxyError {
    fn from(err: Box<pingora_core::Error>) -> Self {
        Self::internal_with_source(format!("Pingora错误: {err}"), err)
    }
}
