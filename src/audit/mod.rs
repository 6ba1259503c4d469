//! # 审计日志
//!
//! 每次代理交换生成一条 `proxy_logs` 记录，网关只写不读

mod body;
mod logger;
mod record;

pub use body::{body_to_text, decode_body, headers_to_json};
pub use logger::AuditLogger;
pub use record::{AuditOutcome, AuditRecord};
