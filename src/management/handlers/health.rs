//! 健康检查相关处理器

use axum::extract::State;
use axum::response::IntoResponse;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::management::{response, server::AppState};
use crate::whitelist::TaskState;

/// 健康状态
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub whitelist_size: usize,
    pub last_refreshed_at: Option<NaiveDateTime>,
    pub refresh_task: TaskState,
    pub consecutive_refresh_errors: u32,
}

/// 存活检查，附带白名单状态
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let stats = state.refresh_task.get_stats().await;
    response::success(HealthStatus {
        status: "ok".to_string(),
        whitelist_size: state.whitelist.len().await,
        last_refreshed_at: state.whitelist.last_refreshed_at().await,
        refresh_task: state.refresh_task.get_state().await,
        consecutive_refresh_errors: stats.consecutive_errors,
    })
}
