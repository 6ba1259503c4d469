//! 路由未命中与方法不允许

use axum::http::{StatusCode, Uri};
use axum::response::Response;

use crate::management::response;

pub async fn not_found(uri: Uri) -> Response {
    response::error(
        StatusCode::NOT_FOUND,
        "PAGE_NOT_FOUND",
        &format!("页面不存在: {}", uri.path()),
    )
}

pub async fn method_not_allowed() -> Response {
    response::error(
        StatusCode::METHOD_NOT_ALLOWED,
        "METHOD_NOT_ALLOWED",
        "请求方法不被允许",
    )
}
