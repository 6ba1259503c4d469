//! # 激活结果呈现
//!
//! 按请求的 `Accept` 选择 JSON 或确认页面，页面渲染交给 `PageRenderer`

use std::sync::Arc;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::Activation;
use crate::error::{ProxyError, Result};
use crate::management::response::{ApiEnvelope, BusinessCode};

/// 与框架无关的响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

impl IntoResponse for RenderedResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, self.content_type)],
            self.body,
        )
            .into_response()
    }
}

/// 激活结果呈现者
pub trait ActivationResponder: Send + Sync {
    fn activated(&self, activation: &Activation) -> RenderedResponse;
    fn failed(&self, error: &ProxyError) -> RenderedResponse;
}

/// 确认页面内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPage<'a> {
    pub title: &'a str,
    pub message: &'a str,
    pub tips: &'a str,
    pub success: bool,
}

/// 确认页面渲染器
pub trait PageRenderer: Send + Sync {
    fn render(&self, page: &ActivationPage<'_>) -> Result<String>;
}

const ACTIVATED_TITLE: &str = "账号已激活";
const ACTIVATED_MESSAGE: &str = "您的账号已激活，现在可以使用访问令牌。";
const FAILED_TITLE: &str = "激活失败";
const IGNORE_TIPS: &str = "如果您没有注册过该服务，请忽略此消息。";

/// JSON 呈现
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonResponder;

impl ActivationResponder for JsonResponder {
    fn activated(&self, activation: &Activation) -> RenderedResponse {
        let envelope = ApiEnvelope::new(
            BusinessCode::Ok,
            format!("{ACTIVATED_MESSAGE}\n{IGNORE_TIPS}"),
            Some(serde_json::json!({
                "user_id": activation.user_id,
                "already_active": activation.already_active,
            })),
        );
        json_response(StatusCode::OK, &envelope)
    }

    fn failed(&self, error: &ProxyError) -> RenderedResponse {
        let (status, _) = error.to_http_response_parts();
        let code = BusinessCode::for_error(error, BusinessCode::ActivateFailed);
        let envelope = ApiEnvelope::<()>::new(code, error.to_string(), None);
        json_response(status, &envelope)
    }
}

fn json_response<T: serde::Serialize>(status: StatusCode, envelope: &ApiEnvelope<T>) -> RenderedResponse {
    let body = serde_json::to_string(envelope).unwrap_or_else(|_| {
        format!(r#"{{"msg":"","code":{}}}"#, BusinessCode::UnknownFailed.code())
    });
    RenderedResponse {
        status,
        content_type: "application/json",
        body,
    }
}

/// 页面呈现
#[derive(Clone)]
pub struct PageResponder {
    renderer: Arc<dyn PageRenderer>,
}

impl PageResponder {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    fn page(&self, status: StatusCode, page: &ActivationPage<'_>) -> RenderedResponse {
        match self.renderer.render(page) {
            Ok(body) => RenderedResponse {
                status,
                content_type: "text/html; charset=utf-8",
                body,
            },
            Err(_) => RenderedResponse {
                status,
                content_type: "text/plain; charset=utf-8",
                body: format!("{}\n{}", page.title, page.message),
            },
        }
    }
}

impl ActivationResponder for PageResponder {
    fn activated(&self, _activation: &Activation) -> RenderedResponse {
        self.page(
            StatusCode::OK,
            &ActivationPage {
                title: ACTIVATED_TITLE,
                message: ACTIVATED_MESSAGE,
                tips: IGNORE_TIPS,
                success: true,
            },
        )
    }

    fn failed(&self, error: &ProxyError) -> RenderedResponse {
        let (status, _) = error.to_http_response_parts();
        let message = error.to_string();
        self.page(
            status,
            &ActivationPage {
                title: FAILED_TITLE,
                message: &message,
                tips: IGNORE_TIPS,
                success: false,
            },
        )
    }
}

/// 内置的最小确认页面
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinPageRenderer;

impl PageRenderer for BuiltinPageRenderer {
    fn render(&self, page: &ActivationPage<'_>) -> Result<String> {
        let class = if page.success { "ok" } else { "ng" };
        Ok(format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
             <body class=\"{class}\">\n<h1>{title}</h1>\n<p>{message}</p>\n<p><small>{tips}</small></p>\n\
             </body>\n</html>\n",
            title = escape_html(page.title),
            message = escape_html(page.message),
            tips = escape_html(page.tips),
        ))
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `Accept` 中包含 `application/json` 时返回 JSON，否则返回页面
pub fn select_responder(
    accept: Option<&str>,
    renderer: &Arc<dyn PageRenderer>,
) -> Box<dyn ActivationResponder> {
    let wants_json = accept.is_some_and(|value| value.to_ascii_lowercase().contains("application/json"));
    if wants_json {
        Box::new(JsonResponder)
    } else {
        Box::new(PageResponder::new(Arc::clone(renderer)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;

    fn renderer() -> Arc<dyn PageRenderer> {
        Arc::new(BuiltinPageRenderer)
    }

    struct BrokenRenderer;

    impl PageRenderer for BrokenRenderer {
        fn render(&self, _page: &ActivationPage<'_>) -> Result<String> {
            Err(ProxyError::internal("template missing"))
        }
    }

    #[test]
    fn test_select_by_accept() {
        let activation = Activation {
            user_id: 1,
            already_active: false,
        };

        let json = select_responder(Some("Application/JSON"), &renderer()).activated(&activation);
        assert_eq!(json.content_type, "application/json");
        let value: serde_json::Value = serde_json::from_str(&json.body).unwrap();
        assert_eq!(value["code"], 0);
        assert_eq!(value["data"]["user_id"], 1);

        let page = select_responder(Some("text/html,*/*"), &renderer()).activated(&activation);
        assert!(page.content_type.starts_with("text/html"));
        assert!(page.body.contains(ACTIVATED_TITLE));

        let default = select_responder(None, &renderer()).activated(&activation);
        assert!(default.content_type.starts_with("text/html"));
    }

    #[test]
    fn test_failure_codes() {
        let err = ProxyError::Auth(AuthError::InvalidOrExpiredToken("used".to_string()));

        let json = JsonResponder.failed(&err);
        assert_eq!(json.status, StatusCode::BAD_REQUEST);
        let value: serde_json::Value = serde_json::from_str(&json.body).unwrap();
        assert_eq!(value["code"], BusinessCode::InvalidToken.code());
        assert!(value.get("data").is_none());

        let page = PageResponder::new(renderer()).failed(&err);
        assert_eq!(page.status, StatusCode::BAD_REQUEST);
        assert!(page.body.contains(FAILED_TITLE));
    }

    #[test]
    fn test_page_escapes_and_falls_back() {
        let html = BuiltinPageRenderer
            .render(&ActivationPage {
                title: "t",
                message: "<script>alert(1)</script>",
                tips: "",
                success: false,
            })
            .unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));

        let fallback = PageResponder::new(Arc::new(BrokenRenderer)).activated(&Activation {
            user_id: 1,
            already_active: true,
        });
        assert!(fallback.content_type.starts_with("text/plain"));
        assert!(fallback.body.contains(ACTIVATED_TITLE));
    }
}
