//! # 错误处理宏

/// 确保参数合法，否则返回校验错误
#[macro_export]
macro_rules! ensure_valid {
    ($cond:expr, $field:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::error::ProxyError::validation($msg, Some($field)));
        }
    };
}
