//! # 双端口配置
//!
//! 管理端口（注册/激活）与代理端口（受令牌保护的转发）分开监听

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// 双端口服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualPortServerConfig {
    /// 管理服务配置
    #[serde(default)]
    pub management: ManagementPortConfig,
    /// 代理服务配置
    #[serde(default)]
    pub proxy: ProxyPortConfig,
    /// 代理工作线程数 (可选，默认CPU核心数)
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// 管理端口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagementPortConfig {
    /// HTTP 监听配置
    pub http: ListenerConfig,
}

/// 代理端口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyPortConfig {
    /// HTTP 监听配置
    pub http: ListenerConfig,
}

/// 监听器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for DualPortServerConfig {
    fn default() -> Self {
        Self {
            management: ManagementPortConfig::default(),
            proxy: ProxyPortConfig::default(),
            workers: default_workers(),
        }
    }
}

impl Default for ManagementPortConfig {
    fn default() -> Self {
        Self {
            http: ListenerConfig {
                host: "127.0.0.1".to_string(),
                port: 9090,
            },
        }
    }
}

impl Default for ProxyPortConfig {
    fn default() -> Self {
        Self {
            http: ListenerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
        }
    }
}

impl ListenerConfig {
    /// 获取绑定地址
    pub fn bind_address(&self) -> std::io::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid address '{addr}': {e}"),
            )
        })
    }
}

impl DualPortServerConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        let mgmt_port = self.management.http.port;
        let proxy_port = self.proxy.http.port;

        if mgmt_port == 0 || proxy_port == 0 {
            return Err("Ports must be greater than 0".to_string());
        }

        if mgmt_port == proxy_port {
            return Err(format!(
                "Management port ({mgmt_port}) conflicts with proxy port ({proxy_port})"
            ));
        }

        if self.workers == 0 {
            return Err("Worker count must be greater than 0".to_string());
        }

        self.management
            .http
            .bind_address()
            .map_err(|e| format!("Invalid management HTTP address: {e}"))?;

        self.proxy
            .http
            .bind_address()
            .map_err(|e| format!("Invalid proxy HTTP address: {e}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dual_port_config_default() {
        let config = DualPortServerConfig::default();

        assert_eq!(config.management.http.port, 9090);
        assert_eq!(config.proxy.http.port, 8080);
        assert!(config.workers > 0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DualPortServerConfig::default();
        assert!(config.validate().is_ok());

        // 端口冲突
        config.proxy.http.port = 9090;
        assert!(config.validate().is_err());

        config.proxy.http.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_listener_bind_address() {
        let listener = ListenerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        };

        let addr = listener.bind_address().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:8080");

        let bad = ListenerConfig {
            host: "not a host".to_string(),
            port: 8080,
        };
        assert!(bad.bind_address().is_err());
    }
}
