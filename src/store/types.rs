//! # 存储层输入类型

use chrono::NaiveDateTime;
use serde::Deserialize;

/// 注册时提交的身份信息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserIdentity {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub device_info: String,
    pub password: String,
}

/// 待写入的令牌
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewToken {
    pub user_id: i32,
    pub token_type: &'static str,
    pub token: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
