//! # 请求/响应体与头部的审计表示

use std::borrow::Cow;
use std::io::Read;

use axum::http::HeaderMap;
use flate2::read::{GzDecoder, ZlibDecoder};
use serde_json::{Map, Value};

/// 按 `Content-Encoding` 解码，输出不超过 `max_out` 字节
///
/// 未知编码或解码失败时返回原始字节
pub fn decode_body<'a>(encoding: Option<&str>, input: &'a [u8], max_out: usize) -> Cow<'a, [u8]> {
    let normalize = |e: &str| {
        e.split(',')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    };

    let decoded = match encoding.map(normalize).as_deref() {
        Some("gzip" | "x-gzip") => read_bounded(GzDecoder::new(input), input.len(), max_out),
        Some("deflate") => read_bounded(ZlibDecoder::new(input), input.len(), max_out),
        Some("br") => read_bounded(
            brotli_decompressor::Decompressor::new(input, 4096),
            input.len(),
            max_out,
        ),
        _ => None,
    };

    decoded.map_or_else(
        || Cow::Borrowed(&input[..input.len().min(max_out)]),
        Cow::Owned,
    )
}

fn read_bounded<R: Read>(mut reader: R, hint: usize, max_out: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(hint.min(max_out));
    let mut buf = [0u8; 8192];
    while out.len() < max_out {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let take = n.min(max_out - out.len());
                out.extend_from_slice(&buf[..take]);
            }
            Err(_) if out.is_empty() => return None,
            Err(_) => break,
        }
    }
    Some(out)
}

/// 转为审计文本：空体为 `None`，非 UTF-8 字节按有损方式替换，超出上限截断
#[must_use]
pub fn body_to_text(encoding: Option<&str>, body: &[u8], max_bytes: usize) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let decoded = decode_body(encoding, body, max_bytes);
    Some(String::from_utf8_lossy(&decoded).into_owned())
}

/// 头部序列化为 JSON 对象，同名头部以 `, ` 合并
#[must_use]
pub fn headers_to_json(headers: &HeaderMap) -> String {
    let mut map = Map::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        match map.get_mut(name.as_str()) {
            Some(Value::String(existing)) => {
                existing.push_str(", ");
                existing.push_str(&value);
            }
            _ => {
                map.insert(name.as_str().to_string(), Value::String(value));
            }
        }
    }
    Value::Object(map).to_string()
}
