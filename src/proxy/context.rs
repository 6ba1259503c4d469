//! # 代理上下文模块
//!
//! 单次代理请求在各个 Pingora 阶段之间传递的状态

use std::sync::Arc;
use std::time::Instant;

use chrono::{NaiveDateTime, Utc};

use super::gateway::AuthorizedUser;
use super::router::Route;
use crate::audit::{AuditOutcome, AuditRecord, body_to_text};
use crate::error::{AuthError, ProxyError};

/// 请求上下文
#[derive(Debug)]
pub struct ProxyContext {
    /// 请求ID
    pub request_id: String,
    /// 开始时间
    pub start_time: Instant,
    pub request_time: NaiveDateTime,
    pub method: String,
    /// 路径与查询串
    pub url: String,
    pub remote_addr: Option<String>,
    /// 客户端请求的原始 Host
    pub original_host: Option<String>,
    /// 命中的路由
    pub route: Option<Arc<Route>>,
    /// 认证通过的用户
    pub user: Option<AuthorizedUser>,
    /// 认证失败原因
    pub rejection: Option<AuthError>,
    /// 网关令牌移除后的请求头 JSON
    pub request_headers: String,
    pub request_encoding: Option<String>,
    /// 请求体缓冲区 (用于request_body_filter中的数据收集)
    pub request_body: Vec<u8>,
    pub response_status: Option<u16>,
    pub response_headers: Option<String>,
    pub response_encoding: Option<String>,
    /// 响应体缓冲区 (用于response_body_filter中的数据收集)
    pub response_body: Vec<u8>,
    /// 转发失败原因
    pub upstream_error: Option<ProxyError>,
    /// 单个缓冲区的上限
    pub body_limit: usize,
}

impl ProxyContext {
    pub fn new(request_id: String, body_limit: usize) -> Self {
        Self {
            request_id,
            start_time: Instant::now(),
            request_time: Utc::now().naive_utc(),
            method: String::new(),
            url: String::new(),
            remote_addr: None,
            original_host: None,
            route: None,
            user: None,
            rejection: None,
            request_headers: "{}".to_string(),
            request_encoding: None,
            request_body: Vec::new(),
            response_status: None,
            response_headers: None,
            response_encoding: None,
            response_body: Vec::new(),
            upstream_error: None,
            body_limit,
        }
    }

    /// 追加请求体，超出上限的部分丢弃
    pub fn add_request_chunk(&mut self, chunk: &[u8]) {
        append_bounded(&mut self.request_body, chunk, self.body_limit);
    }

    /// 追加响应体，超出上限的部分丢弃
    pub fn add_response_chunk(&mut self, chunk: &[u8]) {
        append_bounded(&mut self.response_body, chunk, self.body_limit);
    }

    /// 本次交换的审计结果；未进入认证阶段的请求返回 `None`
    #[must_use]
    pub fn outcome(&self, failed: bool) -> Option<AuditOutcome> {
        if self.user.is_some() {
            if failed || self.upstream_error.is_some() {
                Some(AuditOutcome::Failed)
            } else {
                Some(AuditOutcome::Success)
            }
        } else if self.rejection.is_some() {
            Some(AuditOutcome::Rejected)
        } else {
            None
        }
    }

    /// 构建审计记录
    #[must_use]
    pub fn to_audit_record(&self, outcome: AuditOutcome, error: Option<String>) -> AuditRecord {
        let error_message = error
            .or_else(|| self.upstream_error.as_ref().map(ToString::to_string))
            .or_else(|| self.rejection.as_ref().map(ToString::to_string));

        AuditRecord {
            user_id: self.user.as_ref().map(|u| u.user_id),
            request_id: self.request_id.clone(),
            remote_addr: self.remote_addr.clone(),
            request_time: self.request_time,
            method: self.method.clone(),
            url: self.url.clone(),
            request_headers: self.request_headers.clone(),
            request_body: body_to_text(
                self.request_encoding.as_deref(),
                &self.request_body,
                self.body_limit,
            ),
            response_status: self.response_status,
            response_headers: self.response_headers.clone(),
            response_body: body_to_text(
                self.response_encoding.as_deref(),
                &self.response_body,
                self.body_limit,
            ),
            outcome,
            error_message,
            created_at: Utc::now().naive_utc(),
        }
    }
}

fn append_bounded(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize) {
    let room = limit.saturating_sub(buffer.len());
    buffer.extend_from_slice(&chunk[..chunk.len().min(room)]);
}
