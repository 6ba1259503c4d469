//! # 审计记录

use chrono::NaiveDateTime;
use serde::Serialize;

/// 交换结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// 上游正常返回
    Success,
    /// 转发或上游出错
    Failed,
    /// 认证未通过，未转发
    Rejected,
}

impl AuditOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }
}

/// 一次代理交换的审计记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub user_id: Option<i32>,
    pub request_id: String,
    pub remote_addr: Option<String>,
    pub request_time: NaiveDateTime,
    pub method: String,
    pub url: String,
    /// JSON 对象，凭证头已移除
    pub request_headers: String,
    pub request_body: Option<String>,
    pub response_status: Option<u16>,
    pub response_headers: Option<String>,
    pub response_body: Option<String>,
    pub outcome: AuditOutcome,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
}
