//! # 配置管理器
//!
//! 读取 TOML 配置文件，应用 `ALLY_` 前缀的环境变量覆盖并校验

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::AppConfig;
use crate::error::{ProxyError, Result};
use crate::{
    ldebug, linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// 环境变量前缀
const ENV_PREFIX: &str = "ALLY_";
/// 指定配置文件路径的环境变量
const CONFIG_PATH_ENV: &str = "ALLY_CONFIG_PATH";

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: AppConfig,
    source: PathBuf,
    env_overrides: HashMap<String, String>,
}

impl ConfigManager {
    /// 按 `ALLY_CONFIG_PATH` 或 `config/config.{RUST_ENV}.toml` 加载
    pub fn new() -> Result<Self> {
        Self::from_file(Self::default_config_path())
    }

    /// 默认配置文件路径
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        env::var(CONFIG_PATH_ENV).map_or_else(
            |_| {
                let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
                PathBuf::from(format!("config/config.{env}.toml"))
            },
            PathBuf::from,
        )
    }

    /// 从指定文件创建配置管理器，进程环境变量作为覆盖
    pub fn from_file(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        let content = Self::read_config_file(config_path)?;
        let manager = Self::from_toml_str(&content, Self::build_env_overrides(env::vars()))?;

        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "config_loaded",
            &format!("配置加载完成: {}", config_path.display()),
            overrides = manager.env_overrides.len(),
            routes = manager.config.routes.len()
        );

        Ok(Self {
            source: config_path.to_path_buf(),
            ..manager
        })
    }

    /// 从 TOML 文本与给定覆盖项构建
    pub fn from_toml_str(content: &str, env_overrides: HashMap<String, String>) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(content)
            .map_err(|e| ProxyError::config_with_source(format!("TOML解析失败: {e}"), e))?;

        Self::apply_env_overrides(&mut config, &env_overrides)?;

        config
            .validate()
            .map_err(|e| ProxyError::config(format!("配置校验失败: {e}")))?;

        Ok(Self {
            config,
            source: PathBuf::new(),
            env_overrides,
        })
    }

    /// 获取当前配置
    #[must_use]
    pub const fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// 取出配置
    #[must_use]
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// 配置来源文件
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    fn read_config_file(path: &Path) -> Result<String> {
        if !path.exists() {
            return Err(ProxyError::config(format!(
                "配置文件不存在: {}",
                path.display()
            )));
        }

        std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
        })
    }

    /// 构建环境变量覆盖映射
    ///
    /// `ALLY_DATABASE_URL` -> `database.url`
    pub fn build_env_overrides<I>(vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: HashMap<String, String> = vars
            .into_iter()
            .filter(|(key, _)| key != CONFIG_PATH_ENV)
            .filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|rest| (rest.to_lowercase().replace('_', "."), value))
            })
            .collect();

        ldebug!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "env_overrides",
            &format!("发现 {} 个环境变量覆盖", overrides.len())
        );
        overrides
    }

    fn apply_env_overrides(
        config: &mut AppConfig,
        overrides: &HashMap<String, String>,
    ) -> Result<()> {
        for (path, value) in overrides {
            let shown = if path.contains("key") || path.contains("password") {
                "***"
            } else {
                value.as_str()
            };
            ldebug!(
                "system",
                LogStage::Configuration,
                LogComponent::Config,
                "apply_override",
                &format!("应用环境变量覆盖: {path} = {shown}")
            );
            Self::apply_override_to_config(config, path, value)?;
        }
        Ok(())
    }

    fn apply_override_to_config(config: &mut AppConfig, path: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["database", "url"] => config.database.url = value.to_string(),
            ["database", "max", "connections"] => {
                config.database.max_connections = parse_value(path, value)?;
            }
            ["database", "connect", "timeout"] => {
                config.database.connect_timeout = parse_value(path, value)?;
            }
            ["management", "host"] => config.dual_port.management.http.host = value.to_string(),
            ["management", "port"] => {
                config.dual_port.management.http.port = parse_value(path, value)?;
            }
            ["proxy", "host"] => config.dual_port.proxy.http.host = value.to_string(),
            ["proxy", "port"] => config.dual_port.proxy.http.port = parse_value(path, value)?,
            ["workers"] => config.dual_port.workers = parse_value(path, value)?,
            ["whitelist", "refresh", "interval", "seconds"] => {
                config.whitelist.refresh_interval_seconds = parse_value(path, value)?;
            }
            ["upstream", "api", "key"] => config.upstream.api_key = value.to_string(),
            ["upstream", "organization"] => {
                config.upstream.organization = Some(value.to_string()).filter(|v| !v.is_empty());
            }
            ["registration", "allowed", "email", "domains"] => {
                config.registration.allowed_email_domains = value
                    .split(',')
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ["registration", "direct", "email", "notify"] => {
                config.registration.direct_email_notify = parse_value(path, value)?;
            }
            ["registration", "auto", "activate"] => {
                config.registration.auto_activate = parse_value(path, value)?;
            }
            ["registration", "external", "endpoint"] => {
                config.registration.external_endpoint = value.to_string();
            }
            ["registration", "notify", "webhook", "url"] => {
                config.registration.notify_webhook_url =
                    Some(value.to_string()).filter(|v| !v.is_empty());
            }
            ["audit", "enabled"] => config.audit.enabled = parse_value(path, value)?,
            ["audit", "record", "rejected"] => {
                config.audit.record_rejected = parse_value(path, value)?;
            }
            ["audit", "max", "body", "bytes"] => {
                config.audit.max_body_bytes = parse_value(path, value)?;
            }
            _ => {
                lwarn!(
                    "system",
                    LogStage::Configuration,
                    LogComponent::Config,
                    "unknown_override",
                    &format!("未知的配置路径，忽略环境变量覆盖: {path}")
                );
            }
        }

        Ok(())
    }
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.trim().parse().map_err(|e| {
        ProxyError::config_with_source(format!("环境变量覆盖 {path} 的值无效: {value}"), e)
    })
}
