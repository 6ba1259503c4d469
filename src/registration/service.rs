//! # 注册与激活服务

use std::sync::Arc;

use chrono::Utc;
use entity::user_tokens::{TOKEN_TYPE_ACCESS, TOKEN_TYPE_ACTIVATION};
use entity::users;

use super::{ActivationNotifier, activation_link};
use crate::config::RegistrationConfig;
use crate::ensure_valid;
use crate::error::{ProxyError, Result};
use crate::logging::mask_token;
use crate::store::{CredentialStore, UserIdentity};
use crate::token::{IssuedToken, TokenLifecycleManager, lifetime_window};
use crate::whitelist::WhitelistCache;
use crate::{
    linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// 注册结果
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: users::Model,
    pub activation_token: IssuedToken,
    pub access_token: IssuedToken,
    /// 是否已直接激活
    pub activated: bool,
    /// 激活通知发送失败时的提示，注册本身不回滚
    pub warning: Option<String>,
}

/// 激活结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub user_id: i32,
    /// 激活前用户已处于可用状态
    pub already_active: bool,
}

/// 校验邮箱格式与域名白名单
///
/// 域名不在允许列表中时返回 `field = "email_domain"` 的校验错误
pub fn validate_email(email: &str, allowed_domains: &[String]) -> Result<()> {
    let email = email.trim();
    ensure_valid!(!email.is_empty(), "email", "邮箱不能为空");
    ensure_valid!(
        !email.chars().any(char::is_whitespace),
        "email",
        "邮箱不能包含空白字符"
    );

    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return Err(ProxyError::validation("邮箱格式无效", Some("email"))),
    };
    ensure_valid!(
        !local.is_empty() && !domain.is_empty(),
        "email",
        "邮箱格式无效"
    );

    if !allowed_domains.is_empty()
        && !allowed_domains
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(domain))
    {
        return Err(ProxyError::validation(
            format!("邮箱域名不允许注册: {domain}"),
            Some("email_domain"),
        ));
    }
    Ok(())
}

/// 注册与激活服务
pub struct RegistrationService {
    store: Arc<dyn CredentialStore>,
    tokens: TokenLifecycleManager,
    whitelist: Arc<WhitelistCache>,
    notifier: Arc<dyn ActivationNotifier>,
    config: RegistrationConfig,
}

impl RegistrationService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        tokens: TokenLifecycleManager,
        whitelist: Arc<WhitelistCache>,
        notifier: Arc<dyn ActivationNotifier>,
        config: RegistrationConfig,
    ) -> Self {
        Self {
            store,
            tokens,
            whitelist,
            notifier,
            config,
        }
    }

    /// 注册或重新注册用户，签发激活令牌与访问令牌
    pub async fn register(&self, identity: &UserIdentity) -> Result<Registration> {
        validate_email(&identity.email, &self.config.allowed_email_domains)?;
        let identity = UserIdentity {
            email: identity.email.trim().to_string(),
            ..identity.clone()
        };

        let now = Utc::now().naive_utc();
        let user = self.store.upsert_user(&identity, now).await?;

        // 重新注册时旧令牌全部作废
        let expired_access = self
            .store
            .expire_user_tokens(user.id, TOKEN_TYPE_ACCESS, now)
            .await?;
        self.store
            .expire_user_tokens(user.id, TOKEN_TYPE_ACTIVATION, now)
            .await?;
        self.whitelist.revoke_user(user.id).await;

        let activation_token = self.tokens.issue_activation_token(user.id).await?;
        let access_token = self.tokens.issue_access_token(user.id).await?;

        linfo!(
            "system",
            LogStage::Registration,
            LogComponent::Registration,
            "user_registered",
            "用户注册完成",
            user_id = user.id,
            email = %user.email,
            expired_tokens = expired_access
        );

        let activated = if self.config.auto_activate {
            self.activate_user(user.id).await?;
            let now = Utc::now().naive_utc();
            if let Some(entry) = self
                .store
                .find_whitelist_entry(&access_token.token, now)
                .await?
            {
                self.whitelist.admit(entry, now).await;
            }
            true
        } else {
            false
        };

        let warning = if self.config.direct_email_notify && !activated {
            self.notify(&user, &activation_token.token).await
        } else {
            None
        };

        Ok(Registration {
            user,
            activation_token,
            access_token,
            activated,
            warning,
        })
    }

    /// 兑换激活令牌并启用用户
    ///
    /// 用户状态写入成功后才消费令牌，写入失败时令牌仍可重试。
    /// 新激活的用户在下一次白名单刷新后可用
    pub async fn activate(&self, activation_token: &str) -> Result<Activation> {
        let token = activation_token.trim();
        ensure_valid!(!token.is_empty(), "token", "激活令牌不能为空");

        let model = self.tokens.find_activation_token(token).await?;
        let user_id = model.user_id;
        let now = Utc::now().naive_utc();

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ProxyError::invalid_token("激活令牌对应的用户不存在"))?;
        let already_active = user.is_usable_at(now);
        if !already_active {
            self.activate_user(user_id).await?;
        }
        self.tokens.consume_activation_token(&model).await?;

        if !already_active {
            linfo!(
                "system",
                LogStage::Activation,
                LogComponent::Registration,
                "user_activated",
                "用户已激活",
                user_id = user_id,
                token = %mask_token(token)
            );
        }
        Ok(Activation {
            user_id,
            already_active,
        })
    }

    /// 停用用户并立即从白名单移除
    pub async fn deactivate(&self, user_id: i32) -> Result<bool> {
        let now = Utc::now().naive_utc();
        let rows = self.store.deactivate_user(user_id, now).await?;
        self.store
            .expire_user_tokens(user_id, TOKEN_TYPE_ACCESS, now)
            .await?;
        self.whitelist.revoke_user(user_id).await;

        linfo!(
            "system",
            LogStage::Registration,
            LogComponent::Registration,
            "user_deactivated",
            "用户已停用",
            user_id = user_id,
            found = rows > 0
        );
        Ok(rows > 0)
    }

    async fn activate_user(&self, user_id: i32) -> Result<()> {
        let now = Utc::now().naive_utc();
        let rows = self
            .store
            .activate_user(user_id, now, now + lifetime_window())
            .await?;
        if rows == 0 {
            return Err(ProxyError::internal(format!("激活用户失败: id={user_id}")));
        }
        Ok(())
    }

    async fn notify(&self, user: &users::Model, token: &str) -> Option<String> {
        let result = match activation_link(&self.config.external_endpoint, token) {
            Ok(link) => self.notifier.send_activation(user, &link).await,
            Err(e) => Err(e),
        };

        result.err().map(|e| {
            lwarn!(
                "system",
                LogStage::Registration,
                LogComponent::Notifier,
                "notify_failed",
                &format!("激活通知发送失败: {e}"),
                user_id = user.id
            );
            e.to_string()
        })
    }
}
