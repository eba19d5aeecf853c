//! # Inno Transport
//!
//! 帧源抽象层：从 TCP 字节流、UDP 数据报或录制文件中读取 cframe，
//! 以及把 SDK 风格的推送回调桥接为拉取接口。
//!
//! ## 线上格式
//!
//! ```text
//! "PS32"                      (仅 TCP 连接开始时一次；UDP 每个数据报都带)
//! u32 BE len | source id      (len 必须为 4)
//! u32 BE len | frame header   (len 必须为 76)
//! u32 BE len | items          (len = item_size * item_number)
//! ```

use inno_protocol::{AlarmMessage, Frame, ProtocolError};
use std::time::Duration;
use thiserror::Error;

pub mod bridge;
pub mod replay;
pub mod stream;
pub mod tcp;
pub mod udp;

pub use bridge::{BridgeSender, CallbackBridge};
pub use replay::{ReplayOptions, ReplaySource};
pub use stream::{DEFAULT_STALL_TIMEOUT, StreamFrameReader, encode_stream_frame};
pub use tcp::{TcpFrameSource, TcpOptions};
pub use udp::{UdpFrameSource, UdpOptions, encode_datagram, parse_datagram};

/// 协议魔数
pub const MAGIC: &[u8; 4] = b"PS32";

/// 单个分段长度上限，超过即认为流已失步
pub const MAX_SEGMENT_LEN: usize = 64 * 1024 * 1024;

/// 订阅命令
///
/// `topics` 为空时订阅全部主题。
pub fn subscribe_command(topics: &[u32]) -> String {
    let csv = topics
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("start/?subscribe_topics={}\n", csv)
}

/// 传输层统一错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 单帧结构错误（可恢复，丢弃该帧）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("End of stream")]
    EndOfStream,

    #[error("Truncated segment: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Invalid source magic: {0:?}")]
    BadMagic([u8; 4]),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Cannot set socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        source: std::io::Error,
    },

    #[error("Cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("Cannot send subscribe command: {0}")]
    Subscribe(std::io::Error),

    #[error("Segment too large: {0} bytes")]
    SegmentTooLarge(usize),

    /// UDP 单个数据报无效（可恢复）
    #[error("Invalid datagram ({len} bytes): {reason}")]
    InvalidDatagram { len: usize, reason: &'static str },

    #[error("Read timeout")]
    Timeout,

    #[error("Source disconnected")]
    Disconnected,
}

impl TransportError {
    /// 是否只影响当前帧（连接可继续读取）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Protocol(_)
                | TransportError::InvalidDatagram { .. }
                | TransportError::Timeout
        )
    }

    /// 负错误码
    ///
    /// 帧结构错误沿用 [`ProtocolError::code`]，连接类错误使用 -100 以下的区间，
    /// 两者互不重叠。
    pub fn code(&self) -> i32 {
        match self {
            TransportError::Protocol(e) => e.code(),
            TransportError::EndOfStream => -100,
            TransportError::InvalidAddress(_) => -102,
            TransportError::SocketOption { .. } => -106,
            TransportError::Connect { .. } => -108,
            TransportError::Subscribe(_) => -109,
            TransportError::Io(_) => -110,
            TransportError::Truncated { .. } => -111,
            TransportError::SegmentTooLarge(_) => -112,
            TransportError::BadMagic(_) => -104,
            TransportError::InvalidDatagram { .. } => -113,
            TransportError::Timeout => -114,
            TransportError::Disconnected => -115,
        }
    }
}

/// 帧源产生的事件
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// 解码后的一帧
    Frame(Frame),
    /// 传感器状态字符串（JSON）
    Status(String),
    /// 传感器告警
    Alarm(AlarmMessage),
}

/// 帧源（拉取式）
///
/// 同一个帧源只被一个投递线程使用，事件严格按到达顺序返回。
pub trait FrameSource: Send {
    /// 等待下一个事件
    ///
    /// # 返回
    ///
    /// - `Ok(Some(event))`: 收到事件
    /// - `Ok(None)`: `timeout` 内无事件
    /// - `Err(e)`: `e.is_recoverable()` 为真时丢弃当前帧继续读取，否则结束
    fn next_event(&mut self, timeout: Duration) -> Result<Option<SourceEvent>, TransportError>;

    /// 帧源描述（日志用）
    fn describe(&self) -> String {
        String::from("frame source")
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<SourceEvent>, TransportError> {
        (**self).next_event(timeout)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// 把解码后的帧转为事件：告警帧展开为 `Alarm`
pub(crate) fn frame_event(frame: Frame) -> SourceEvent {
    match frame.items {
        inno_protocol::FrameItems::Alarms(mut alarms) if alarms.len() == 1 => {
            let mut alarm = alarms.remove(0);
            if alarm.source_id == 0 {
                alarm.source_id = frame.source_id;
            }
            SourceEvent::Alarm(alarm)
        }
        _ => SourceEvent::Frame(frame),
    }
}
