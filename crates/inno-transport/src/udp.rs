//! UDP 帧源
//!
//! 每个数据报自包含：魔数 + 一组三段式帧，不做跨数据报重组。

use crate::stream::put_segment;
use crate::{FrameSource, MAGIC, SourceEvent, TransportError, frame_event};
use inno_protocol::{Frame, FramingError, HEADER_SIZE, decode_frame};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::trace;

/// 常见 MTU 下的数据报缓冲区大小
pub const DEFAULT_DATAGRAM_SIZE: usize = 1500;

/// 魔数 + 三个长度前缀 + 头部
const POINT_OFFSET: usize = 4 + 4 + 4 + 4 + HEADER_SIZE + 4;

/// UDP 参数
#[derive(Debug, Clone)]
pub struct UdpOptions {
    /// 接收缓冲区大小，超过该长度的数据报会被截断并在校验时被拒绝
    pub max_datagram_size: usize,
}

impl Default for UdpOptions {
    fn default() -> Self {
        Self {
            max_datagram_size: DEFAULT_DATAGRAM_SIZE,
        }
    }
}

/// 解析单个数据报
pub fn parse_datagram(datagram: &[u8]) -> Result<Frame, TransportError> {
    let len = datagram.len();
    if len <= 8 {
        return Err(TransportError::InvalidDatagram {
            len,
            reason: "datagram too short",
        });
    }
    if &datagram[..4] != MAGIC {
        return Err(TransportError::InvalidDatagram {
            len,
            reason: "bad magic",
        });
    }

    let be = |offset: usize| -> usize {
        let mut word = [0u8; 4];
        word.copy_from_slice(&datagram[offset..offset + 4]);
        u32::from_be_bytes(word) as usize
    };

    let source_len = be(4);
    if source_len != 4 {
        return Err(FramingError::SourceIdLength(source_len).into());
    }
    if len < 16 {
        return Err(TransportError::InvalidDatagram {
            len,
            reason: "datagram too short",
        });
    }
    let header_len = be(12);
    if header_len != HEADER_SIZE {
        return Err(FramingError::HeaderSize {
            expected: HEADER_SIZE,
            actual: header_len,
        }
        .into());
    }
    if len < POINT_OFFSET {
        return Err(TransportError::InvalidDatagram {
            len,
            reason: "datagram too short",
        });
    }
    let items_len = be(POINT_OFFSET - 4);
    if items_len != len - POINT_OFFSET {
        return Err(FramingError::SegmentLength {
            declared: items_len,
            actual: len - POINT_OFFSET,
        }
        .into());
    }

    let source_id = be(8) as u32;
    let header = &datagram[16..16 + HEADER_SIZE];
    Ok(decode_frame(source_id, header, &datagram[POINT_OFFSET..])?)
}

/// 把一帧编码为单个数据报
pub fn encode_datagram(frame: &Frame) -> Vec<u8> {
    let payload = frame.payload_bytes();
    let mut out = Vec::with_capacity(POINT_OFFSET + payload.len());
    out.extend_from_slice(MAGIC);
    put_segment(&mut out, &frame.source_id.to_be_bytes());
    put_segment(&mut out, &frame.header.encode());
    put_segment(&mut out, &payload);
    out
}

/// UDP 帧源
pub struct UdpFrameSource {
    socket: UdpSocket,
    buf: Vec<u8>,
    read_timeout: Option<Duration>,
}

impl UdpFrameSource {
    /// 绑定本地端口
    pub fn bind(addr: impl ToSocketAddrs, options: &UdpOptions) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).map_err(|e| TransportError::Connect {
            addr: String::from("udp bind"),
            source: e,
        })?;
        Ok(Self {
            socket,
            buf: vec![0u8; options.max_datagram_size.max(POINT_OFFSET)],
            read_timeout: None,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}

impl FrameSource for UdpFrameSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<SourceEvent>, TransportError> {
        let timeout = Some(timeout.max(Duration::from_millis(1)));
        if self.read_timeout != timeout {
            self.socket
                .set_read_timeout(timeout)
                .map_err(|e| TransportError::SocketOption {
                    option: "SO_RCVTIMEO",
                    source: e,
                })?;
            self.read_timeout = timeout;
        }

        let n = match self.socket.recv_from(&mut self.buf) {
            Ok((n, from)) => {
                trace!("[UdpFrameSource] {} bytes from {}", n, from);
                n
            },
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Ok(None);
            },
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(TransportError::Io(e)),
        };

        let frame = parse_datagram(&self.buf[..n])?;
        Ok(Some(frame_event(frame)))
    }

    fn describe(&self) -> String {
        match self.socket.local_addr() {
            Ok(addr) => format!("udp://{}", addr),
            Err(_) => String::from("udp://?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::encode_stream_frame;
    use inno_protocol::{
        AlarmCode, AlarmLevel, AlarmMessage, CompactPoint, CompactPointFields, FrameHeader,
        ProtocolError,
    };

    fn sample_frame(n: usize) -> Frame {
        let points = (0..n)
            .map(|i| {
                CompactPoint::from_fields(CompactPointFields {
                    radius: 100 * i as u16,
                    h_angle: 5,
                    v_angle: -5,
                    ..Default::default()
                })
            })
            .collect();
        Frame::from_compact_points(0x0102_0304, FrameHeader::default(), points)
    }

    #[test]
    fn test_parse_datagram() {
        let frame = sample_frame(10);
        let datagram = encode_datagram(&frame);
        assert_eq!(datagram.len(), 4 + encode_stream_frame(&frame).len());
        assert_eq!(parse_datagram(&datagram).unwrap(), frame);
    }

    #[test]
    fn test_short_datagram() {
        let err = parse_datagram(b"PS32\0\0\0\x04").unwrap_err();
        assert!(matches!(err, TransportError::InvalidDatagram { len: 8, .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_bad_magic_datagram() {
        let mut datagram = encode_datagram(&sample_frame(1));
        datagram[0] = b'X';
        assert!(matches!(
            parse_datagram(&datagram),
            Err(TransportError::InvalidDatagram { reason: "bad magic", .. })
        ));
    }

    #[test]
    fn test_points_length_mismatch() {
        let mut datagram = encode_datagram(&sample_frame(2));
        datagram.push(0);
        let err = parse_datagram(&datagram).unwrap_err();
        assert!(matches!(
            err,
            TransportError::Protocol(ProtocolError::Framing(FramingError::SegmentLength { .. }))
        ));
    }

    #[test]
    fn test_source_and_header_length_checks() {
        let mut datagram = encode_datagram(&sample_frame(1));
        datagram[7] = 5;
        assert_eq!(parse_datagram(&datagram).unwrap_err().code(), -1);

        let mut datagram = encode_datagram(&sample_frame(1));
        datagram[15] = 70;
        assert_eq!(parse_datagram(&datagram).unwrap_err().code(), -2);
    }

    #[test]
    fn test_udp_source_receives_frames_and_alarms() {
        let mut source = UdpFrameSource::bind("127.0.0.1:0", &UdpOptions::default()).unwrap();
        let addr = source.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        let frame = sample_frame(3);
        sender.send_to(&encode_datagram(&frame), addr).unwrap();
        let alarm = AlarmMessage::new(AlarmLevel::Warning, AlarmCode::SlowNetwork, "slow");
        sender
            .send_to(&encode_datagram(&Frame::from_alarm(9, alarm.clone())), addr)
            .unwrap();
        sender.send_to(b"garbage", addr).unwrap();

        let event = source.next_event(Duration::from_secs(2)).unwrap();
        assert_eq!(event, Some(SourceEvent::Frame(frame)));

        let event = source.next_event(Duration::from_secs(2)).unwrap();
        let expected = AlarmMessage {
            source_id: 9,
            ..alarm
        };
        assert_eq!(event, Some(SourceEvent::Alarm(expected)));

        let err = source.next_event(Duration::from_secs(2)).unwrap_err();
        assert!(err.is_recoverable());

        assert_eq!(source.next_event(Duration::from_millis(20)).unwrap(), None);
    }
}
