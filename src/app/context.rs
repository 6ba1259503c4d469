//! 应用上下文（DI 容器）
//!
//! 统一持有跨模块共享的服务实例，便于在测试中注入替身实现。

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::audit::AuditLogger;
use crate::config::AppConfig;
use crate::error::Result;
use crate::proxy::{AuthGateway, RouteTable};
use crate::registration::{
    ActivationNotifier, BuiltinPageRenderer, LogNotifier, PageRenderer, RegistrationService,
    WebhookNotifier,
};
use crate::store::{CredentialStore, SeaOrmCredentialStore};
use crate::token::TokenLifecycleManager;
use crate::whitelist::{WhitelistCache, WhitelistRefreshTask};
use crate::{
    linfo,
    logging::{LogComponent, LogStage},
};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub store: Arc<dyn CredentialStore>,
    pub tokens: TokenLifecycleManager,
    pub whitelist: Arc<WhitelistCache>,
    pub refresh_task: Arc<WhitelistRefreshTask>,
    pub registration: Arc<RegistrationService>,
    pub gateway: AuthGateway,
    pub audit: AuditLogger,
    pub routes: Arc<RouteTable>,
    pub page_renderer: Arc<dyn PageRenderer>,
}

impl AppContext {
    /// 根据配置与数据库连接装配全部服务
    pub fn build(config: Arc<AppConfig>, db: Arc<DatabaseConnection>) -> Result<Arc<Self>> {
        let store: Arc<dyn CredentialStore> =
            Arc::new(SeaOrmCredentialStore::new(Arc::clone(&db)));
        let notifier = Self::build_notifier(&config)?;
        Self::with_parts(config, db, store, notifier)
    }

    /// 使用给定的存储与通知实现装配
    pub fn with_parts(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn ActivationNotifier>,
    ) -> Result<Arc<Self>> {
        let routes = Arc::new(RouteTable::from_config(&config.routes)?);
        let tokens = TokenLifecycleManager::new(Arc::clone(&store));
        let whitelist = Arc::new(WhitelistCache::new(Arc::clone(&store)));
        let refresh_task = Arc::new(WhitelistRefreshTask::new(
            Arc::clone(&whitelist),
            config.whitelist.effective_interval(),
        ));
        let registration = Arc::new(RegistrationService::new(
            Arc::clone(&store),
            tokens.clone(),
            Arc::clone(&whitelist),
            notifier,
            config.registration.clone(),
        ));
        let gateway = AuthGateway::new(Arc::clone(&whitelist), tokens.clone(), Arc::clone(&store));
        let audit = AuditLogger::new(Arc::clone(&store), config.audit.clone());

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "context_built",
            "应用上下文装配完成",
            routes = routes.len(),
            refresh_interval_secs = refresh_task.period().as_secs()
        );

        Ok(Arc::new(Self {
            config,
            db,
            store,
            tokens,
            whitelist,
            refresh_task,
            registration,
            gateway,
            audit,
            routes,
            page_renderer: Arc::new(BuiltinPageRenderer),
        }))
    }

    fn build_notifier(config: &AppConfig) -> Result<Arc<dyn ActivationNotifier>> {
        Ok(match config.registration.notify_webhook_url.as_deref() {
            Some(url) => Arc::new(WebhookNotifier::new(url)?),
            None => Arc::new(LogNotifier),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
