//! # 令牌生命周期
//!
//! 激活令牌一次性使用；访问令牌按 31 天滑动窗口续期，
//! 自创建起超过窗口后改为轮换出新的令牌值。

mod manager;

pub use manager::{IssuedToken, TokenLifecycleManager, TokenRefresh};

use chrono::Duration;

/// 单个续期单位（小时）
pub const MAX_TOKEN_LIFE_SPAN_HOURS: i64 = 24;

/// 强制轮换前允许的续期单位数
pub const MAX_EXTEND_TIMES: i64 = 31;

/// `MAX_EXTEND_TIMES × MAX_TOKEN_LIFE_SPAN`
#[must_use]
pub fn lifetime_window() -> Duration {
    Duration::hours(MAX_TOKEN_LIFE_SPAN_HOURS * MAX_EXTEND_TIMES)
}
