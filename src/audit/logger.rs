//! # 审计记录持久化

use std::sync::Arc;

use super::{AuditOutcome, AuditRecord};
use crate::config::AuditConfig;
use crate::error::Result;
use crate::store::CredentialStore;
use crate::{
    ldebug, lerror,
    logging::{LogComponent, LogStage},
};

/// 审计日志写入器
#[derive(Clone)]
pub struct AuditLogger {
    store: Arc<dyn CredentialStore>,
    config: AuditConfig,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn CredentialStore>, config: AuditConfig) -> Self {
        Self { store, config }
    }

    /// 请求/响应体保存上限
    #[must_use]
    pub const fn max_body_bytes(&self) -> usize {
        self.config.max_body_bytes
    }

    /// 按配置判断该结果是否需要落库
    #[must_use]
    pub const fn should_record(&self, outcome: AuditOutcome) -> bool {
        if !self.config.enabled {
            return false;
        }
        match outcome {
            AuditOutcome::Rejected => self.config.record_rejected,
            AuditOutcome::Success | AuditOutcome::Failed => true,
        }
    }

    /// 写入审计记录，按配置跳过时返回 `None`
    pub async fn record(&self, record: AuditRecord) -> Result<Option<i32>> {
        if !self.should_record(record.outcome) {
            return Ok(None);
        }

        let request_id = record.request_id.clone();
        let outcome = record.outcome;
        let id = self.store.insert_audit_record(record).await?;

        ldebug!(
            &request_id,
            LogStage::Audit,
            LogComponent::Audit,
            "audit_saved",
            "审计记录已写入",
            audit_id = id,
            outcome = outcome.as_str()
        );
        Ok(Some(id))
    }

    /// 写入审计记录，失败只记录日志
    pub async fn record_or_log(&self, record: AuditRecord) {
        let request_id = record.request_id.clone();
        if let Err(e) = self.record(record).await {
            lerror!(
                &request_id,
                LogStage::Audit,
                LogComponent::Audit,
                "audit_failed",
                &format!("审计记录写入失败: {e}")
            );
        }
    }
}
