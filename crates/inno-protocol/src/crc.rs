//! HTTP 风格文本响应的 CRC32
//!
//! 校验范围：`url`（可选）+ 两个 BEL 分隔符 + 正文。
//! 正文从第一个 `\r\n\r\n` 之后开始，校验值以 `X-INNO-CRC32: xxxxxxxx`
//! 头部携带。多项式为 IEEE（crc32fast），计算与校验两端自洽即可。

use crate::ProtocolError;

/// CRC 头部名
pub const CRC_HEADER_TOKEN: &str = "X-INNO-CRC32";
/// url 与正文之间的分隔符
pub const CRC_SEPARATOR: &[u8; 2] = b"\x07\x07";
/// 头部与正文之间的分隔符
pub const BODY_SEPARATOR: &[u8; 4] = b"\r\n\r\n";
/// 十六进制校验值长度
pub const CRC_HEX_LEN: usize = 8;

/// 校验结果（非错误）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcCheck {
    /// 校验值一致
    Verified,
    /// 响应未携带校验头，跳过校验
    NotPresent,
}

impl CrcCheck {
    /// 0 = 通过，1 = 跳过
    pub fn code(self) -> i32 {
        match self {
            CrcCheck::Verified => 0,
            CrcCheck::NotPresent => 1,
        }
    }
}

/// 计算 `url` + 分隔符 + `body` 的 CRC32
///
/// `url` 为 `None` 时不追加分隔符。
pub fn http_crc32(url: Option<&[u8]>, body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    if let Some(url) = url {
        hasher.update(url);
        hasher.update(CRC_SEPARATOR);
    }
    hasher.update(body);
    hasher.finalize()
}

/// 生成带校验头的响应
///
/// `head` 为状态行及其他头部（不含结尾空行），例如 `"HTTP/1.1 200 OK"`。
pub fn append_crc32_header(head: &str, url: Option<&[u8]>, body: &[u8]) -> Vec<u8> {
    let crc = http_crc32(url, body);
    let mut out = Vec::with_capacity(head.len() + body.len() + 32);
    out.extend_from_slice(head.trim_end_matches("\r\n").as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(format!("{}: {:08x}", CRC_HEADER_TOKEN, crc).as_bytes());
    out.extend_from_slice(BODY_SEPARATOR);
    out.extend_from_slice(body);
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// 提取校验头后的 8 个字符（跳过冒号与空白）
fn received_token(response: &[u8], token_pos: usize) -> String {
    let rest = &response[token_pos + CRC_HEADER_TOKEN.len()..];
    let start = rest
        .iter()
        .position(|&b| b != b':' && b != b' ' && b != b'\t')
        .unwrap_or(rest.len());
    let rest = &rest[start..];
    let end = rest.len().min(CRC_HEX_LEN);
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

/// 校验响应中的 CRC
///
/// # 返回
///
/// - `Ok(CrcCheck::Verified)`: 一致
/// - `Ok(CrcCheck::NotPresent)`: 无校验头，跳过
/// - `Err(ProtocolError::ChecksumMismatch)`: 不一致或校验值无法解析
/// - `Err(ProtocolError::MissingBody)`: 有校验头但找不到 `\r\n\r\n`
pub fn verify_http_crc32(response: &[u8], url: Option<&[u8]>) -> Result<CrcCheck, ProtocolError> {
    let Some(token_pos) = find(response, CRC_HEADER_TOKEN.as_bytes()) else {
        return Ok(CrcCheck::NotPresent);
    };
    let received = received_token(response, token_pos);

    let Some(sep) = find(response, BODY_SEPARATOR) else {
        return Err(ProtocolError::MissingBody);
    };
    let body = &response[sep + BODY_SEPARATOR.len()..];
    let calculated = http_crc32(url, body);

    // 大小写不敏感，兼容空格填充的 `%8x` 格式
    match u32::from_str_radix(received.trim(), 16) {
        Ok(value) if value == calculated => Ok(CrcCheck::Verified),
        _ => Err(ProtocolError::ChecksumMismatch {
            calculated,
            received,
        }),
    }
}

/// 以整数状态码返回校验结果（0 通过，1 跳过，负数失败）
pub fn verify_http_crc32_code(response: &[u8], url: Option<&[u8]>) -> i32 {
    match verify_http_crc32(response, url) {
        Ok(check) => check.code(),
        Err(e) => e.code(),
    }
}
