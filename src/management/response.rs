//! # API 响应结构
//!
//! 客户端约定的 `{msg, code, data}` 信封，以及路由未命中时的错误体

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::{
    lerror,
    logging::{LogComponent, LogStage},
};

/// 业务码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusinessCode {
    Ok,
    InvalidParameters,
    InvalidToken,
    TokenGenerateFailed,
    RegisterFailed,
    SendEmailFailed,
    ActivateFailed,
    UnknownFailed,
}

impl BusinessCode {
    /// 线上数值
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::InvalidParameters => 1000,
            Self::InvalidToken => 1002,
            Self::TokenGenerateFailed => 1005,
            Self::RegisterFailed => 1007,
            Self::SendEmailFailed => 1008,
            Self::ActivateFailed => 1009,
            Self::UnknownFailed => 1012,
        }
    }

    /// 错误对应的业务码，无法归类时使用 `fallback`
    #[must_use]
    pub fn for_error(error: &ProxyError, fallback: Self) -> Self {
        match error.root() {
            ProxyError::Validation { field, .. } if field.as_deref() == Some("email_domain") => {
                Self::RegisterFailed
            }
            ProxyError::Validation { .. } => Self::InvalidParameters,
            ProxyError::Auth(_) => Self::InvalidToken,
            ProxyError::Notification { .. } => Self::SendEmailFailed,
            _ => fallback,
        }
    }
}

/// 统一响应信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub msg: String,
    pub code: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn new(code: BusinessCode, msg: impl Into<String>, data: Option<T>) -> Self {
        Self {
            msg: msg.into(),
            code: code.code(),
            data,
        }
    }
}

/// 路由级错误体
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// # API响应枚举
///
/// 统一所有API出口，方便转换为 `axum::response::Response`
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    Success(T),
    SuccessWithMessage(T, String),
    /// 业务失败，`BusinessCode` 为无法归类时的兜底
    AppError(ProxyError, BusinessCode),
    /// 路由级错误，如 404/405
    Error(StatusCode, &'static str, String),
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Success(data) => (
                StatusCode::OK,
                Json(ApiEnvelope::new(BusinessCode::Ok, "success", Some(data))),
            )
                .into_response(),
            Self::SuccessWithMessage(data, message) => (
                StatusCode::OK,
                Json(ApiEnvelope::new(BusinessCode::Ok, message, Some(data))),
            )
                .into_response(),
            Self::AppError(error, fallback) => {
                let (status, _) = error.to_http_response_parts();
                if status.is_server_error() {
                    lerror!(
                        "system",
                        LogStage::Error,
                        LogComponent::Management,
                        "request_failed",
                        &format!("管理接口处理失败: {error}")
                    );
                }
                let code = BusinessCode::for_error(&error, fallback);
                (
                    status,
                    Json(ApiEnvelope::<()>::new(code, error.to_string(), None)),
                )
                    .into_response()
            }
            Self::Error(status, code, message) => (
                status,
                Json(ErrorInfo {
                    code: code.to_string(),
                    message,
                }),
            )
                .into_response(),
        }
    }
}

/// # 便捷函数：成功响应
pub fn success<T: Serialize>(data: T) -> Response {
    ApiResponse::Success(data).into_response()
}

/// # 便捷函数：带消息的成功响应
pub fn success_with_message<T: Serialize>(data: T, message: &str) -> Response {
    ApiResponse::SuccessWithMessage(data, message.to_string()).into_response()
}

/// # 便捷函数：业务错误响应
pub fn app_error(error: ProxyError, fallback: BusinessCode) -> Response {
    ApiResponse::<()>::AppError(error, fallback).into_response()
}

/// # 便捷函数：HTTP错误响应
pub fn error(status: StatusCode, code: &'static str, message: &str) -> Response {
    ApiResponse::<()>::Error(status, code, message.to_string()).into_response()
}
