//! # 路由配置

use axum::Router;
use axum::routing::{get, post};

use super::handlers::{fallback, health, user};
use super::server::AppState;

/// 创建所有路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/user/register", post(user::register))
        .route("/user/register/", post(user::register))
        .route("/user/activate/{token}", get(user::activate))
        .fallback(fallback::not_found)
        .method_not_allowed_fallback(fallback::method_not_allowed)
        .with_state(state)
}
