//! 注册与激活处理器

use axum::Extension;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::ProxyError;
use crate::management::middleware::RequestId;
use crate::management::response::{self, BusinessCode};
use crate::management::server::AppState;
use crate::registration::select_responder;
use crate::store::UserIdentity;
use crate::{
    linfo, lwarn,
    logging::{LogComponent, LogStage},
};

/// 注册成功返回的数据
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterData {
    pub access_token: String,
    pub expired_at: NaiveDateTime,
    pub activated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// `POST /user/register/`
pub async fn register(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<UserIdentity>, JsonRejection>,
) -> Response {
    let Json(identity) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            lwarn!(
                &request_id,
                LogStage::Registration,
                LogComponent::Management,
                "invalid_payload",
                &format!("注册请求体无效: {}", rejection.body_text())
            );
            return response::app_error(
                ProxyError::validation(format!("请求参数无效: {}", rejection.body_text()), None),
                BusinessCode::RegisterFailed,
            );
        }
    };

    match state.registration.register(&identity).await {
        Ok(registration) => {
            linfo!(
                &request_id,
                LogStage::Registration,
                LogComponent::Management,
                "registered",
                "注册请求处理完成",
                user_id = registration.user.id,
                activated = registration.activated
            );
            let message = if registration.activated {
                "注册成功，账号已激活"
            } else {
                "注册成功，请查收激活邮件完成激活"
            };
            response::success_with_message(
                RegisterData {
                    access_token: registration.access_token.token,
                    expired_at: registration.access_token.expires_at,
                    activated: registration.activated,
                    warning: registration.warning,
                },
                message,
            )
        }
        Err(e) => {
            lwarn!(
                &request_id,
                LogStage::Registration,
                LogComponent::Management,
                "register_failed",
                &format!("注册失败: {e}")
            );
            response::app_error(e, BusinessCode::RegisterFailed)
        }
    }
}

/// `GET /user/activate/{token}`
pub async fn activate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> Response {
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let responder = select_responder(accept, &state.page_renderer);

    match state.registration.activate(&token).await {
        Ok(activation) => {
            linfo!(
                &request_id,
                LogStage::Activation,
                LogComponent::Management,
                "activated",
                "激活请求处理完成",
                user_id = activation.user_id,
                already_active = activation.already_active
            );
            responder.activated(&activation).into_response()
        }
        Err(e) => {
            lwarn!(
                &request_id,
                LogStage::Activation,
                LogComponent::Management,
                "activate_failed",
                &format!("激活失败: {e}")
            );
            responder.failed(&e).into_response()
        }
    }
}
