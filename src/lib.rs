//! # Ally Gateway
//!
//! 凭证签发与白名单网关核心库：注册激活签发令牌，代理端口凭令牌访问共享上游

pub mod app;
pub mod audit;
pub mod config;
pub mod database;
pub mod dual_port_setup;
pub mod error;
pub mod logging;
pub mod management;
pub mod proxy;
pub mod registration;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod token;
pub mod whitelist;

pub use config::AppConfig;
pub use error::{ProxyError, Result};
