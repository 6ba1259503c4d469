//! # Pingora 网关代理服务
//!
//! 按路径选择上游，凭网关令牌放行，转发后续期令牌并写入审计记录

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pingora_core::upstreams::peer::{HttpPeer, Peer};
use pingora_core::{Error as PingoraError, ErrorSource, ErrorType};
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{FailToProxy, ProxyHttp, Session};
use uuid::Uuid;

use super::GATEWAY_TOKEN_HEADER;
use super::context::ProxyContext;
use super::forwarding::rewrite_upstream_request;
use super::gateway::AuthGateway;
use super::response::{
    JsonError, build_auth_error_response, build_not_found_response,
    build_upstream_error_response, write_json_error,
};
use super::router::RouteTable;
use crate::audit::{AuditLogger, headers_to_json};
use crate::config::UpstreamConfig;
use crate::error::{AuthError, ProxyError};
use crate::logging::mask_token;
use crate::{
    ldebug, lerror, linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// 网关代理服务
pub struct GatewayProxyService {
    routes: Arc<RouteTable>,
    upstream: UpstreamConfig,
    gateway: AuthGateway,
    audit: AuditLogger,
}

impl GatewayProxyService {
    pub fn new(
        routes: Arc<RouteTable>,
        upstream: UpstreamConfig,
        gateway: AuthGateway,
        audit: AuditLogger,
    ) -> Self {
        Self {
            routes,
            upstream,
            gateway,
            audit,
        }
    }

    /// 校验网关令牌并记入上下文，拒绝时返回应直接写回客户端的响应
    async fn authenticate(
        &self,
        token: Option<&str>,
        ctx: &mut ProxyContext,
    ) -> Option<JsonError> {
        match self.gateway.authorize(token).await {
            Ok(user) => {
                ldebug!(
                    &ctx.request_id,
                    LogStage::Authentication,
                    LogComponent::Gateway,
                    "authorized",
                    "网关令牌校验通过",
                    user_id = user.user_id,
                    token = %mask_token(&user.token)
                );
                ctx.user = Some(user);
                None
            }
            Err(e) => {
                let reason = match e {
                    ProxyError::Auth(reason) => reason,
                    _ => AuthError::AccessDenied,
                };
                lwarn!(
                    &ctx.request_id,
                    LogStage::Authentication,
                    LogComponent::Gateway,
                    "rejected",
                    &format!("网关令牌校验失败: {reason}"),
                    code = reason.code()
                );
                let response = build_auth_error_response(&reason);
                ctx.response_status = Some(response.status);
                ctx.rejection = Some(reason);
                Some(response)
            }
        }
    }

    /// 记录上游响应头，并为已认证用户回写续期后的令牌
    async fn accept_upstream_response(
        &self,
        upstream_response: &mut ResponseHeader,
        ctx: &mut ProxyContext,
    ) -> pingora_core::Result<()> {
        ctx.response_status = Some(upstream_response.status.as_u16());
        ctx.response_encoding = header_str(&upstream_response.headers, "content-encoding");
        ctx.response_headers = Some(headers_to_json(&upstream_response.headers));

        if let Some(user) = ctx.user.clone() {
            if let Some(token) = self.gateway.complete(&ctx.request_id, &user).await {
                upstream_response.insert_header(GATEWAY_TOKEN_HEADER, token)?;
            }
        }
        Ok(())
    }

    /// 按本次交换的结果写入审计记录
    async fn record_exchange(&self, error: Option<&PingoraError>, ctx: &ProxyContext) {
        if let Some(outcome) = ctx.outcome(error.is_some()) {
            let record = ctx.to_audit_record(outcome, error.map(ToString::to_string));
            self.audit.record_or_log(record).await;
        }
    }
}

fn header_str(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// 转发失败时返回给客户端的状态码，0 表示下游已断开无需响应
fn failure_status(error: &PingoraError) -> u16 {
    match error.etype() {
        ErrorType::HTTPStatus(code) => *code,
        ErrorType::ConnectTimedout | ErrorType::ReadTimedout | ErrorType::WriteTimedout
            if error.esource() == &ErrorSource::Upstream =>
        {
            504
        }
        _ => match error.esource() {
            ErrorSource::Upstream => 502,
            ErrorSource::Downstream => match error.etype() {
                ErrorType::WriteError | ErrorType::ReadError | ErrorType::ConnectionClosed => 0,
                _ => 400,
            },
            ErrorSource::Internal | ErrorSource::Unset => 502,
        },
    }
}

#[async_trait]
impl ProxyHttp for GatewayProxyService {
    type CTX = ProxyContext;

    fn new_ctx(&self) -> Self::CTX {
        ProxyContext::new(Uuid::new_v4().to_string(), self.audit.max_body_bytes())
    }

    async fn request_filter(
        &self,
        session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> pingora_core::Result<bool> {
        let req = session.req_header();
        let path = req.uri.path().to_string();
        ctx.method = req.method.to_string();
        ctx.url = req.uri.to_string();
        ctx.original_host =
            header_str(&req.headers, "host").or_else(|| req.uri.host().map(str::to_string));
        ctx.request_encoding = header_str(&req.headers, "content-encoding");
        let token = header_str(&req.headers, GATEWAY_TOKEN_HEADER);
        ctx.remote_addr = session.client_addr().map(ToString::to_string);

        // 网关令牌不转发，也不进入审计
        session.req_header_mut().remove_header(GATEWAY_TOKEN_HEADER);
        ctx.request_headers = headers_to_json(&session.req_header().headers);

        linfo!(
            &ctx.request_id,
            LogStage::RequestStart,
            LogComponent::Proxy,
            "request_received",
            "收到代理请求",
            method = %ctx.method,
            path = %path,
            remote_addr = ctx.remote_addr.as_deref().unwrap_or("-")
        );

        let Some(route) = self.routes.match_path(&path) else {
            lwarn!(
                &ctx.request_id,
                LogStage::RequestStart,
                LogComponent::Proxy,
                "route_not_found",
                "没有匹配的路由",
                path = %path
            );
            ctx.response_status = Some(404);
            write_json_error(session, build_not_found_response(&path)).await?;
            return Ok(true);
        };
        ctx.route = Some(route);

        if let Some(response) = self.authenticate(token.as_deref(), ctx).await {
            // 拒绝的请求到此结束，不会连接上游
            write_json_error(session, response).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn request_body_filter(
        &self,
        _session: &mut Session,
        body: &mut Option<Bytes>,
        _end_of_stream: bool,
        ctx: &mut Self::CTX,
    ) -> pingora_core::Result<()> {
        if let Some(chunk) = body.as_ref() {
            ctx.add_request_chunk(chunk);
        }
        Ok(())
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> pingora_core::Result<Box<HttpPeer>> {
        let route = ctx.route.as_ref().ok_or_else(|| {
            PingoraError::explain(ErrorType::InternalError, "route was not resolved")
        })?;
        let target = &route.target;

        let addr = tokio::net::lookup_host(target.addr.as_str())
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| {
                PingoraError::explain(
                    ErrorType::ConnectNoRoute,
                    format!("failed to resolve upstream {}", target.addr),
                )
            })?;

        let mut peer = HttpPeer::new(addr, target.tls, target.sni.clone());
        if let Some(options) = peer.get_mut_peer_options() {
            let read_timeout = Duration::from_secs(self.upstream.read_timeout_seconds);
            options.connection_timeout =
                Some(Duration::from_secs(self.upstream.connect_timeout_seconds));
            options.read_timeout = Some(read_timeout);
            options.write_timeout = Some(read_timeout);
        }

        ldebug!(
            &ctx.request_id,
            LogStage::UpstreamRequest,
            LogComponent::Upstream,
            "peer_selected",
            "上游节点已选定",
            route = %route.name,
            upstream_addr = %addr,
            tls = target.tls
        );
        Ok(Box::new(peer))
    }

    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> pingora_core::Result<()> {
        let route = ctx.route.as_ref().ok_or_else(|| {
            PingoraError::explain(ErrorType::InternalError, "route was not resolved")
        })?;

        rewrite_upstream_request(
            &ctx.request_id,
            upstream_request,
            route,
            &self.upstream,
            ctx.original_host.as_deref(),
        )
        .map_err(|e| PingoraError::explain(ErrorType::InternalError, e.to_string()))
    }

    async fn response_filter(
        &self,
        _session: &mut Session,
        upstream_response: &mut ResponseHeader,
        ctx: &mut Self::CTX,
    ) -> pingora_core::Result<()> {
        self.accept_upstream_response(upstream_response, ctx).await
    }

    fn response_body_filter(
        &self,
        _session: &mut Session,
        body: &mut Option<Bytes>,
        _end_of_stream: bool,
        ctx: &mut Self::CTX,
    ) -> pingora_core::Result<Option<Duration>> {
        if let Some(chunk) = body.as_ref() {
            ctx.add_response_chunk(chunk);
        }
        Ok(None)
    }

    async fn fail_to_proxy(
        &self,
        session: &mut Session,
        e: &PingoraError,
        ctx: &mut Self::CTX,
    ) -> FailToProxy {
        let status = failure_status(e);
        ctx.upstream_error = Some(ProxyError::bad_gateway(e.to_string()));

        lerror!(
            &ctx.request_id,
            LogStage::ResponseFailure,
            LogComponent::Proxy,
            "proxy_failed",
            &format!("转发失败: {e}"),
            status = status
        );

        if status > 0 && session.response_written().is_none() {
            ctx.response_status = Some(status);
            let response = build_upstream_error_response(status, "上游服务暂不可用，请稍后重试");
            if let Err(write_err) = write_json_error(session, response).await {
                lwarn!(
                    &ctx.request_id,
                    LogStage::ResponseFailure,
                    LogComponent::Proxy,
                    "error_response_failed",
                    &format!("错误响应写入失败: {write_err}")
                );
            }
        }

        FailToProxy {
            error_code: status,
            can_reuse_downstream: false,
        }
    }

    async fn logging(&self, _session: &mut Session, e: Option<&PingoraError>, ctx: &mut Self::CTX) {
        let duration_ms = ctx.start_time.elapsed().as_millis();
        let status = ctx.response_status.unwrap_or(0);

        match e {
            Some(error) => lerror!(
                &ctx.request_id,
                LogStage::Response,
                LogComponent::Proxy,
                "request_failed",
                &format!("代理请求失败: {error}"),
                status = status,
                duration_ms = duration_ms
            ),
            None => linfo!(
                &ctx.request_id,
                LogStage::Response,
                LogComponent::Proxy,
                "request_completed",
                "代理请求完成",
                status = status,
                duration_ms = duration_ms
            ),
        }

        self.record_exchange(e, ctx).await;
    }
}
