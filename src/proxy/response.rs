//! 代理端口直接返回给客户端的 JSON 错误

use bytes::Bytes;
use pingora_core::{Error as PingoraError, ErrorType, Result as PingoraResult};
use pingora_http::ResponseHeader;
use pingora_proxy::Session;
use serde_json::{Value, json};

use crate::error::AuthError;
use crate::management::response::{ApiEnvelope, BusinessCode};

/// 统一的 JSON 错误响应结构
#[derive(Debug, Clone, PartialEq)]
pub struct JsonError {
    pub status: u16,
    pub payload: Value,
}

/// 认证失败：401 + INVALID_TOKEN
#[must_use]
pub fn build_auth_error_response(err: &AuthError) -> JsonError {
    let message = match err {
        AuthError::TokenMissing => "请求缺少网关令牌".to_string(),
        AuthError::AccessDenied => "网关令牌无效或已过期，请重新注册激活".to_string(),
        AuthError::InvalidOrExpiredToken(reason) => format!("网关令牌无效: {reason}"),
    };
    envelope_error(401, BusinessCode::InvalidToken, message)
}

/// 没有匹配的路由
#[must_use]
pub fn build_not_found_response(path: &str) -> JsonError {
    JsonError {
        status: 404,
        payload: json!({
            "code": "PAGE_NOT_FOUND",
            "message": format!("未找到路由: {path}"),
        }),
    }
}

/// 转发失败
#[must_use]
pub fn build_upstream_error_response(status: u16, message: &str) -> JsonError {
    envelope_error(status, BusinessCode::UnknownFailed, message.to_string())
}

fn envelope_error(status: u16, code: BusinessCode, message: String) -> JsonError {
    let envelope = ApiEnvelope::<()>::new(code, message, None);
    let payload = serde_json::to_value(&envelope)
        .unwrap_or_else(|_| json!({ "msg": "", "code": code.code() }));
    JsonError { status, payload }
}

pub async fn write_json_error(session: &mut Session, error: JsonError) -> PingoraResult<()> {
    let body = serde_json::to_vec(&error.payload).map_err(|err| {
        PingoraError::explain(
            ErrorType::InternalError,
            format!("Failed to serialize error payload: {err}"),
        )
    })?;

    let mut resp = ResponseHeader::build(error.status, Some(4)).map_err(|err| {
        PingoraError::explain(
            ErrorType::InternalError,
            format!("Failed to build error response header: {err}"),
        )
    })?;
    resp.insert_header("content-type", "application/json; charset=utf-8")?;
    resp.insert_header("cache-control", "private, no-store")?;
    resp.set_content_length(body.len())?;

    session.write_response_header(Box::new(resp), false).await?;
    session
        .write_response_body(Some(Bytes::from(body)), true)
        .await?;
    Ok(())
}
