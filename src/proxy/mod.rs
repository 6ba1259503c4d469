//! # Pingora 代理服务模块
//!
//! 代理端口：凭网关令牌访问上游服务

pub mod context;
pub mod forwarding;
pub mod gateway;
pub mod pingora_proxy;
pub mod response;
pub mod router;
pub mod service;
pub mod upstream_url;

/// 客户端携带访问令牌的请求头，续期后的令牌也通过它返回
pub const GATEWAY_TOKEN_HEADER: &str = "X-ALLY-TOKEN";

pub use context::ProxyContext;
pub use gateway::{AuthGateway, AuthorizedUser};
pub use pingora_proxy::PingoraProxyServer;
pub use router::{Route, RouteTable};
pub use service::GatewayProxyService;
pub use upstream_url::{UpstreamTarget, parse_target};
