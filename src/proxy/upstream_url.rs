//! 上游地址解析工具
//!
//! 统一处理路由 `target` 可能包含的 scheme / path / port，并输出可用于 Pingora 的 `host:port`。

use url::{Host, Url};

use crate::ensure_config;
use crate::error::{ProxyError, Result};

/// 解析后的上游目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    /// Pingora peer 地址 `host:port`
    pub addr: String,
    /// 转发时使用的 `Host`
    pub host_header: String,
    pub sni: String,
    pub tls: bool,
    /// 目标 URL 自带的路径前缀，例如 `/api`；为空表示根路径
    pub base_path: String,
}

/// 解析路由 `target`，缺少 scheme 时按 https 处理
pub fn parse_target(raw: &str) -> Result<UpstreamTarget> {
    let trimmed = raw.trim();
    ensure_config!(!trimmed.is_empty(), "路由 target 不能为空");

    let url = if trimmed.contains("://") {
        Url::parse(trimmed)?
    } else {
        Url::parse(&format!("https://{trimmed}"))?
    };

    let tls = match url.scheme() {
        "https" => true,
        "http" => false,
        other => {
            return Err(ProxyError::config(format!(
                "路由 target 只支持 http/https: {other}"
            )));
        }
    };

    let host = url
        .host()
        .ok_or_else(|| ProxyError::config(format!("路由 target 缺少 host: {trimmed}")))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ProxyError::config(format!("路由 target 缺少端口: {trimmed}")))?;

    let (host_display, sni) = match host {
        Host::Domain(domain) => (domain.to_string(), domain.to_string()),
        Host::Ipv4(ip) => (ip.to_string(), ip.to_string()),
        Host::Ipv6(ip) => (format!("[{ip}]"), ip.to_string()),
    };

    let addr = format!("{host_display}:{port}");
    let host_header = if url.port().is_some() {
        format!("{host_display}:{port}")
    } else {
        host_display
    };

    Ok(UpstreamTarget {
        addr,
        host_header,
        sni,
        tls,
        base_path: url.path().trim_end_matches('/').to_string(),
    })
}

/// 目标路径前缀与请求路径以单个 `/` 拼接，保留查询串
#[must_use]
pub fn join_upstream_path(base_path: &str, path: &str, query: Option<&str>) -> String {
    let base = base_path.trim_end_matches('/');
    let mut joined = if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    };
    if joined.is_empty() {
        joined.push('/');
    }
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        joined.push('?');
        joined.push_str(query);
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_https_target() {
        let target = parse_target("https://api.openai.com").unwrap();
        assert_eq!(
            target,
            UpstreamTarget {
                addr: "api.openai.com:443".to_string(),
                host_header: "api.openai.com".to_string(),
                sni: "api.openai.com".to_string(),
                tls: true,
                base_path: String::new(),
            }
        );
    }

    #[test]
    fn test_parse_http_target_with_port_and_path() {
        let target = parse_target("http://127.0.0.1:8000/api/").unwrap();
        assert_eq!(target.addr, "127.0.0.1:8000");
        assert_eq!(target.host_header, "127.0.0.1:8000");
        assert!(!target.tls);
        assert_eq!(target.base_path, "/api");
    }

    #[test]
    fn test_parse_target_without_scheme() {
        let target = parse_target("example.com").unwrap();
        assert!(target.tls);
        assert_eq!(target.addr, "example.com:443");
    }

    #[test]
    fn test_parse_target_rejects_bad_input() {
        assert!(parse_target("").is_err());
        assert!(parse_target("ftp://example.com").is_err());
    }

    #[test]
    fn test_join_upstream_path() {
        assert_eq!(join_upstream_path("", "/v1/models", None), "/v1/models");
        assert_eq!(
            join_upstream_path("/api", "/v1/chat", Some("stream=true")),
            "/api/v1/chat?stream=true"
        );
        assert_eq!(join_upstream_path("/api/", "v1", Some("")), "/api/v1");
        assert_eq!(join_upstream_path("", "", None), "/");
    }
}
