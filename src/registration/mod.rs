//! # 注册与激活
//!
//! 注册按邮箱覆盖用户并签发令牌；激活兑换一次性令牌并启用用户。
//! 激活通知与激活结果的呈现都通过可替换的协作者完成。

mod notifier;
mod responder;
mod service;

pub use notifier::{ActivationNotifier, LogNotifier, WebhookNotifier, activation_link};
pub use responder::{
    ActivationPage, ActivationResponder, BuiltinPageRenderer, JsonResponder, PageRenderer,
    PageResponder, RenderedResponse, select_responder,
};
pub use service::{Activation, Registration, RegistrationService, validate_email};
