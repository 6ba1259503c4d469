//! # 白名单缓存模块
//!
//! 访问令牌到用户的内存快照，由后台任务定期从凭证存储整体重建

mod cache;
mod refresh_task;

pub use cache::{WhitelistCache, WhitelistEntry, WhitelistSnapshot};
pub use refresh_task::{TaskState, TaskStats, WhitelistRefreshTask};
