//! # 管理端口处理器

pub mod fallback;
pub mod health;
pub mod user;
