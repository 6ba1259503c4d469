//! # 路由表
//!
//! 按路径前缀选择上游，最长前缀优先，前缀只在路径段边界匹配

use std::sync::Arc;

use super::upstream_url::{UpstreamTarget, parse_target};
use crate::config::RouteConfig;
use crate::error::{Context, Result};

/// 单条路由
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub context: String,
    pub target: UpstreamTarget,
}

impl Route {
    /// `/v1` 匹配 `/v1` 与 `/v1/...`，不匹配 `/v10`
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let context = self.context.trim_end_matches('/');
        if context.is_empty() {
            return true;
        }
        path.strip_prefix(context)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// 路由表
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    /// 按前缀长度降序
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self> {
        let mut routes = configs
            .iter()
            .map(|config| {
                let target = parse_target(&config.target)
                    .with_context(|| format!("路由 '{}' 的 target 无效", config.name))?;
                Ok(Arc::new(Route {
                    name: config.name.clone(),
                    context: config.context.clone(),
                    target,
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        routes.sort_by(|a, b| {
            b.context
                .trim_end_matches('/')
                .len()
                .cmp(&a.context.trim_end_matches('/').len())
        });
        Ok(Self { routes })
    }

    /// 查找请求路径对应的路由
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<Arc<Route>> {
        self.routes.iter().find(|route| route.matches(path)).cloned()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, context: &str, target: &str) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            context: context.to_string(),
            target: target.to_string(),
        }
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = RouteTable::from_config(&[
            route("openai", "/v1", "https://api.openai.com"),
            route("files", "/v1/files", "http://127.0.0.1:9000"),
        ])
        .unwrap();

        assert_eq!(table.match_path("/v1/chat/completions").unwrap().name, "openai");
        assert_eq!(table.match_path("/v1/files/abc").unwrap().name, "files");
        assert_eq!(table.match_path("/v1").unwrap().name, "openai");
        assert!(table.match_path("/v10/models").is_none());
        assert!(table.match_path("/health").is_none());
    }

    #[test]
    fn test_root_context_matches_everything() {
        let table =
            RouteTable::from_config(&[route("all", "/", "https://example.com")]).unwrap();
        assert_eq!(table.match_path("/anything").unwrap().name, "all");
    }

    #[test]
    fn test_invalid_target_names_route() {
        let err = RouteTable::from_config(&[route("broken", "/x", "ftp://example.com")])
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
