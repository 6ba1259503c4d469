//! # 管理服务器中间件

pub mod request_id;

pub use request_id::{RequestId, request_id_middleware};
