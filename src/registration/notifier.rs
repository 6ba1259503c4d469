//! # 激活通知
//!
//! 邮件模板与发送由外部协作者负责，这里只负责把激活链接交出去

use std::time::Duration;

use async_trait::async_trait;
use entity::users;
use serde::Serialize;
use url::Url;

use crate::error::{ProxyError, Result};
use crate::{
    linfo,
    logging::{LogComponent, LogStage},
};

/// 拼接激活链接：以外部地址所在目录为基准追加 `user/activate/<token>`
pub fn activation_link(external_endpoint: &str, token: &str) -> Result<String> {
    let base = Url::parse(external_endpoint)?;
    let link = base.join(&format!("user/activate/{token}"))?;
    Ok(link.to_string())
}

/// 激活通知发送者
#[async_trait]
pub trait ActivationNotifier: Send + Sync {
    async fn send_activation(&self, user: &users::Model, link: &str) -> Result<()>;
}

/// 只写日志的通知者
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ActivationNotifier for LogNotifier {
    async fn send_activation(&self, user: &users::Model, link: &str) -> Result<()> {
        linfo!(
            "system",
            LogStage::Registration,
            LogComponent::Notifier,
            "activation_link",
            "未配置通知 webhook，激活链接仅记录日志",
            user_id = user.id,
            email = %user.email,
            link = %link
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ActivationNotice<'a> {
    username: &'a str,
    email: &'a str,
    activation_link: &'a str,
}

/// 通过 webhook 把激活信息交给外部邮件服务
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProxyError::config_with_source("创建通知 HTTP 客户端失败", e))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ActivationNotifier for WebhookNotifier {
    async fn send_activation(&self, user: &users::Model, link: &str) -> Result<()> {
        let notice = ActivationNotice {
            username: &user.username,
            email: &user.email,
            activation_link: link,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&notice)
            .send()
            .await
            .map_err(|e| ProxyError::notification_with_source("激活通知请求失败", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProxyError::notification(format!(
                "激活通知服务返回错误状态: {status}"
            )));
        }

        linfo!(
            "system",
            LogStage::Registration,
            LogComponent::Notifier,
            "activation_sent",
            "激活通知已发送",
            user_id = user.id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user() -> users::Model {
        let now = Utc::now().naive_utc();
        users::Model {
            id: 3,
            username: "dev".to_string(),
            email: "dev@example.com".to_string(),
            hostname: String::new(),
            device_info: String::new(),
            password: "secret".to_string(),
            is_activated: false,
            is_verified: false,
            registered_at: now,
            activated_at: None,
            expired_at: now,
            deactivated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_activation_link() {
        assert_eq!(
            activation_link("http://127.0.0.1:9090", "abc").unwrap(),
            "http://127.0.0.1:9090/user/activate/abc"
        );
        assert_eq!(
            activation_link("https://ally.example.com/gateway/", "abc").unwrap(),
            "https://ally.example.com/gateway/user/activate/abc"
        );
        assert_eq!(
            activation_link("https://ally.example.com/gateway/register", "abc").unwrap(),
            "https://ally.example.com/gateway/user/activate/abc"
        );
        assert!(activation_link("not a url", "abc").is_err());
    }

    #[tokio::test]
    async fn test_webhook_posts_notice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/notify"))
            .and(body_partial_json(serde_json::json!({
                "email": "dev@example.com",
                "activation_link": "http://x/user/activate/t"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/notify", server.uri())).unwrap();
        notifier
            .send_activation(&user(), "http://x/user/activate/t")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_notification_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        let err = notifier
            .send_activation(&user(), "http://x/user/activate/t")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Notification { .. }));
    }
}
