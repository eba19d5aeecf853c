//! 长度前缀字节流读取器
//!
//! TCP 连接与录制文件共用同一格式：魔数一次，随后是连续的三段式帧。

use crate::{MAGIC, MAX_SEGMENT_LEN, TransportError};
use bytes::BufMut;
use inno_protocol::{Frame, FramingError, HEADER_SIZE, decode_frame};
use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

/// 帧中途无进展的最长等待，需小于驱动停止时的线程回收超时
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(1);

/// 字节流帧读取器
///
/// 三个分段总是被完整读出后才做校验，单帧错误不会导致流失步。
pub struct StreamFrameReader<R> {
    inner: R,
    magic_checked: bool,
    stall_timeout: Duration,
}

impl<R: Read> StreamFrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            magic_checked: false,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    /// 已读过魔数的流（例如握手阶段已单独校验）
    pub fn with_magic_checked(inner: R) -> Self {
        Self {
            inner,
            magic_checked: true,
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    /// 帧中途连续超时超过 `timeout` 即放弃该连接
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// 读满 `buf`
    ///
    /// - `EINTR` 重试
    /// - 在帧边界上（`at_boundary` 且尚未读到任何字节）读到 0 字节视为流结束，
    ///   超时视为无数据
    /// - 帧中途读到 0 字节，或超过 `stall_timeout` 没有新数据，视为截断
    fn read_full(&mut self, buf: &mut [u8], at_boundary: bool) -> Result<(), TransportError> {
        let mut filled = 0;
        let mut stalled_since: Option<Instant> = None;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    if at_boundary && filled == 0 {
                        return Err(TransportError::EndOfStream);
                    }
                    return Err(TransportError::Truncated {
                        expected: buf.len(),
                        actual: filled,
                    });
                },
                Ok(n) => {
                    filled += n;
                    stalled_since = None;
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    if at_boundary && filled == 0 {
                        return Err(TransportError::Timeout);
                    }
                    let since = *stalled_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= self.stall_timeout {
                        return Err(TransportError::Truncated {
                            expected: buf.len(),
                            actual: filled,
                        });
                    }
                },
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
        Ok(())
    }

    /// 校验魔数（只执行一次）
    pub fn read_magic(&mut self) -> Result<(), TransportError> {
        if self.magic_checked {
            return Ok(());
        }
        let mut magic = [0u8; 4];
        self.read_full(&mut magic, true)?;
        if &magic != MAGIC {
            return Err(TransportError::BadMagic(magic));
        }
        self.magic_checked = true;
        Ok(())
    }

    /// 读取一个 `u32 BE len | payload` 分段
    fn read_segment(&mut self, at_boundary: bool) -> Result<Vec<u8>, TransportError> {
        let mut len_buf = [0u8; 4];
        self.read_full(&mut len_buf, at_boundary)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_SEGMENT_LEN {
            return Err(TransportError::SegmentTooLarge(len));
        }
        let mut payload = vec![0u8; len];
        self.read_full(&mut payload, false)?;
        Ok(payload)
    }

    /// 读取并解码一帧
    ///
    /// 帧结构错误以 `TransportError::Protocol` 返回（可恢复），
    /// 流结束、截断与 IO 错误不可恢复。
    pub fn read_frame(&mut self) -> Result<Frame, TransportError> {
        self.read_magic()?;

        let source = self.read_segment(true)?;
        let header = self.read_segment(false)?;
        let items = self.read_segment(false)?;

        let source_id = match <[u8; 4]>::try_from(source.as_slice()) {
            Ok(bytes) => u32::from_be_bytes(bytes),
            Err(_) => return Err(FramingError::SourceIdLength(source.len()).into()),
        };
        if header.len() != HEADER_SIZE {
            return Err(FramingError::HeaderSize {
                expected: HEADER_SIZE,
                actual: header.len(),
            }
            .into());
        }
        Ok(decode_frame(source_id, &header, &items)?)
    }
}

impl From<FramingError> for TransportError {
    fn from(e: FramingError) -> Self {
        TransportError::Protocol(e.into())
    }
}

/// 追加一个 `u32 BE len | payload` 分段
pub(crate) fn put_segment(out: &mut Vec<u8>, payload: &[u8]) {
    out.put_u32(payload.len() as u32);
    out.put_slice(payload);
}

/// 把一帧编码为三段式字节（不含魔数）
pub fn encode_stream_frame(frame: &Frame) -> Vec<u8> {
    let payload = frame.payload_bytes();
    let mut out = Vec::with_capacity(12 + HEADER_SIZE + 4 + payload.len());
    put_segment(&mut out, &frame.source_id.to_be_bytes());
    put_segment(&mut out, &frame.header.encode());
    put_segment(&mut out, &payload);
    out
}
