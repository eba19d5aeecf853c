//! # Inno Protocol
//!
//! Innovusion 激光雷达 cframe 线协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `header`: cframe 头部（76 字节）及帧类型、标志位
//! - `point`: 点类型（原始点、紧凑点、扩展紧凑点）
//! - `items`: 非点类型条目（包围盒、文本、告警）
//! - `frame`: 按类型标签解码后的强类型帧
//! - `crc`: HTTP 风格文本响应的 CRC32 计算与校验
//!
//! ## 字节序
//!
//! 结构体内容为 packed 小端布局（与传感器 SDK 的 C 结构一致），
//! 传输层的长度前缀为网络字节序（大端），由 `inno-transport` 处理。

pub mod crc;
pub mod frame;
pub mod header;
pub mod items;
pub mod point;

pub use crc::*;
pub use frame::*;
pub use header::*;
pub use items::*;
pub use point::*;

use thiserror::Error;

/// cframe 版本号
pub const CFRAME_VERSION: u8 = 6;

/// 紧凑点角度单位（弧度）：π / 8192
pub const ANGLE_UNIT_RAD: f64 = std::f64::consts::PI / 8192.0;

/// 地理坐标单位（弧度）
pub const GEO_CO_UNIT_RAD: f64 = 0.000_000_001_745_329_277_77;

/// 帧结构错误
///
/// 每个变体对应一个独立的负错误码（见 [`FramingError::code`]），
/// 传输层在丢弃该帧后继续读取后续帧。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("Invalid header size: expected {expected}, got {actual}")]
    HeaderSize { expected: usize, actual: usize },

    #[error("Invalid item size for {frame_type:?}: expected {expected}, got {actual}")]
    ItemSize {
        frame_type: FrameType,
        expected: usize,
        actual: usize,
    },

    #[error("Unknown frame type: {0}")]
    UnknownType(u32),

    #[error("Payload length {length} is not a multiple of item size {item_size}")]
    PayloadNotAligned { length: usize, item_size: usize },

    #[error("Item number mismatch: header declares {declared}, payload holds {actual}")]
    ItemCountMismatch { declared: u32, actual: usize },

    #[error("Invalid source id length: expected 4, got {0}")]
    SourceIdLength(usize),

    #[error("Alarm frame must carry exactly one message, got {0}")]
    AlarmCount(usize),

    #[error("Segment length mismatch: declared {declared}, available {actual}")]
    SegmentLength { declared: usize, actual: usize },
}

impl FramingError {
    /// 负错误码，每个变体唯一
    pub fn code(&self) -> i32 {
        match self {
            FramingError::SourceIdLength(_) => -1,
            FramingError::HeaderSize { .. } => -2,
            FramingError::PayloadNotAligned { .. } => -3,
            FramingError::ItemCountMismatch { .. } => -4,
            FramingError::UnknownType(_) => -5,
            FramingError::ItemSize { .. } => -6,
            FramingError::AlarmCount(_) => -7,
            FramingError::SegmentLength { .. } => -8,
        }
    }
}

/// 协议层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("CRC check failed: calculated {calculated:08x}, received {received}")]
    ChecksumMismatch { calculated: u32, received: String },

    #[error("Missing header/body separator")]
    MissingBody,
}

impl ProtocolError {
    /// 负数状态码（CRC 校验失败统一为 -1）
    pub fn code(&self) -> i32 {
        match self {
            ProtocolError::ChecksumMismatch { .. } | ProtocolError::MissingBody => -1,
            ProtocolError::Framing(e) => e.code(),
            ProtocolError::InvalidLength { .. } => -2,
        }
    }
}

/// 检查缓冲区长度至少为 `expected`
pub(crate) fn ensure_len(buf: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if buf.len() < expected {
        return Err(ProtocolError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// 从定长 C 字符串字段中取出 UTF-8 文本（遇到首个 0 截断）
pub(crate) fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
