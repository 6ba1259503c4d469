//! # 上游请求改写
//!
//! 替换上游凭证、补齐 Host 与转发头，路径按目标前缀拼接，路由前缀不剥离

use axum::http::Uri;
use pingora_http::RequestHeader;

use super::GATEWAY_TOKEN_HEADER;
use super::router::Route;
use super::upstream_url::join_upstream_path;
use crate::config::UpstreamConfig;
use crate::error::{Context, ProxyError, Result};
use crate::{
    ldebug,
    logging::{LogComponent, LogStage},
};

/// 改写发往上游的请求头
pub fn rewrite_upstream_request(
    request_id: &str,
    upstream_request: &mut RequestHeader,
    route: &Route,
    upstream: &UpstreamConfig,
    original_host: Option<&str>,
) -> Result<()> {
    let path = join_upstream_path(
        &route.target.base_path,
        upstream_request.uri.path(),
        upstream_request.uri.query(),
    );
    let uri: Uri = path
        .parse()
        .map_err(|e| ProxyError::internal_with_source(format!("上游路径无效: {path}"), e))?;
    upstream_request.set_uri(uri);

    upstream_request.remove_header(GATEWAY_TOKEN_HEADER);
    upstream_request.remove_header("authorization");
    upstream_request
        .insert_header("authorization", format!("Bearer {}", upstream.api_key))
        .context("设置上游 Authorization 失败")?;

    if let Some(organization) = upstream.organization.as_deref() {
        upstream_request
            .insert_header("openai-organization", organization)
            .context("设置 OpenAI-Organization 失败")?;
    }

    if let Some(host) = original_host.filter(|h| !h.is_empty()) {
        upstream_request
            .insert_header("x-forwarded-host", host)
            .context("设置 X-Forwarded-Host 失败")?;
    }

    upstream_request.remove_header("host");
    upstream_request
        .insert_header("host", &route.target.host_header)
        .context("设置上游 Host 失败")?;

    ldebug!(
        request_id,
        LogStage::RequestModify,
        LogComponent::Upstream,
        "request_rewritten",
        "上游请求改写完成",
        route = %route.name,
        upstream_addr = %route.target.addr,
        uri = %upstream_request.uri
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::upstream_url::parse_target;
    use pretty_assertions::assert_eq;

    fn route(target: &str) -> Route {
        Route {
            name: "openai".to_string(),
            context: "/v1".to_string(),
            target: parse_target(target).unwrap(),
        }
    }

    fn upstream(organization: Option<&str>) -> UpstreamConfig {
        UpstreamConfig {
            api_key: "sk-upstream".to_string(),
            organization: organization.map(str::to_string),
            connect_timeout_seconds: 5,
            read_timeout_seconds: 30,
        }
    }

    fn header_value<'a>(req: &'a RequestHeader, name: &str) -> Option<&'a str> {
        req.headers.get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_rewrite_replaces_credentials_and_host() {
        let mut req =
            RequestHeader::build("POST", b"/v1/chat/completions?stream=true", None).unwrap();
        req.insert_header("host", "gateway.local:8080").unwrap();
        req.insert_header("authorization", "Bearer client-key").unwrap();
        req.insert_header(GATEWAY_TOKEN_HEADER, "ally-token").unwrap();

        rewrite_upstream_request(
            "req-1",
            &mut req,
            &route("https://api.openai.com"),
            &upstream(Some("org-42")),
            Some("gateway.local:8080"),
        )
        .unwrap();

        assert_eq!(req.uri.to_string(), "/v1/chat/completions?stream=true");
        assert_eq!(header_value(&req, "authorization"), Some("Bearer sk-upstream"));
        assert_eq!(header_value(&req, "host"), Some("api.openai.com"));
        assert_eq!(header_value(&req, "x-forwarded-host"), Some("gateway.local:8080"));
        assert_eq!(header_value(&req, "openai-organization"), Some("org-42"));
        assert!(req.headers.get(GATEWAY_TOKEN_HEADER).is_none());
    }

    #[test]
    fn test_rewrite_joins_target_path() {
        let mut req = RequestHeader::build("GET", b"/v1/models", None).unwrap();

        rewrite_upstream_request(
            "req-2",
            &mut req,
            &route("http://127.0.0.1:9000/openai/"),
            &upstream(None),
            None,
        )
        .unwrap();

        assert_eq!(req.uri.to_string(), "/openai/v1/models");
        assert_eq!(header_value(&req, "host"), Some("127.0.0.1:9000"));
        assert!(req.headers.get("openai-organization").is_none());
        assert!(req.headers.get("x-forwarded-host").is_none());
    }
}
