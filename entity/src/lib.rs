//! # Entity 模块
//!
//! 网关的三张表：用户、令牌、审计日志

pub mod proxy_logs;
pub mod user_tokens;
pub mod users;

pub use proxy_logs::Entity as ProxyLogs;
pub use user_tokens::Entity as UserTokens;
pub use users::Entity as Users;
