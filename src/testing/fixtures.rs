//! # 测试数据 Fixtures

use crate::config::{
    AppConfig, AuditConfig, DatabaseConfig, DualPortServerConfig, RegistrationConfig,
    RouteConfig, UpstreamConfig, WhitelistConfig,
};
use crate::store::UserIdentity;

/// 注册身份构建器
#[derive(Debug, Clone)]
pub struct IdentityFixture {
    pub username: String,
    pub email: String,
    pub hostname: String,
    pub device_info: String,
    pub password: String,
}

impl Default for IdentityFixture {
    fn default() -> Self {
        Self {
            username: "test_user".to_string(),
            email: "test@example.com".to_string(),
            hostname: "test-host".to_string(),
            device_info: "linux-x86_64".to_string(),
            password: "secret".to_string(),
        }
    }
}

impl IdentityFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置用户名
    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    /// 设置邮箱
    pub fn email(mut self, email: &str) -> Self {
        self.email = email.to_string();
        self
    }

    pub fn device_info(mut self, device_info: &str) -> Self {
        self.device_info = device_info.to_string();
        self
    }

    pub fn build(self) -> UserIdentity {
        UserIdentity {
            username: self.username,
            email: self.email,
            hostname: self.hostname,
            device_info: self.device_info,
            password: self.password,
        }
    }
}

/// 测试配置：内存数据库、单条路由
pub fn test_app_config(upstream_target: &str) -> AppConfig {
    AppConfig {
        dual_port: DualPortServerConfig::default(),
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connect_timeout: 5,
        },
        whitelist: WhitelistConfig::default(),
        upstream: UpstreamConfig {
            api_key: "sk-upstream-test".to_string(),
            organization: None,
            connect_timeout_seconds: 5,
            read_timeout_seconds: 30,
        },
        routes: vec![RouteConfig {
            name: "openai".to_string(),
            context: "/v1".to_string(),
            target: upstream_target.to_string(),
        }],
        registration: RegistrationConfig::default(),
        audit: AuditConfig::default(),
    }
}
