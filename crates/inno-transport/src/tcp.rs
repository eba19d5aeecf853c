//! TCP 帧源
//!
//! 握手：客户端发送订阅命令，服务端回复 `"PS32"`，之后是连续的三段式帧。

use crate::stream::{DEFAULT_STALL_TIMEOUT, StreamFrameReader};
use crate::{FrameSource, SourceEvent, TransportError, frame_event, subscribe_command};
use std::io::Write;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// TCP 连接参数
#[derive(Debug, Clone)]
pub struct TcpOptions {
    /// 订阅的主题，空表示全部
    pub subscribe_topics: Vec<u32>,
    /// 连接超时
    pub connect_timeout: Duration,
    /// 握手（读取魔数）超时
    pub handshake_timeout: Duration,
    /// 帧中途无数据的最长等待，超过后断开
    pub stall_timeout: Duration,
    /// 接收缓冲区大小（SO_RCVBUF，仅 Linux）
    pub recv_buffer_size: usize,
    pub keepalive: bool,
    pub nodelay: bool,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            subscribe_topics: Vec::new(),
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(10),
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            recv_buffer_size: 256 * 1024,
            keepalive: true,
            nodelay: true,
        }
    }
}

/// TCP 帧源
pub struct TcpFrameSource {
    reader: StreamFrameReader<TcpStream>,
    peer: SocketAddr,
    read_timeout: Option<Duration>,
}

impl TcpFrameSource {
    /// 连接、设置 socket 选项、发送订阅命令并校验魔数
    pub fn connect(addr: impl ToSocketAddrs, options: &TcpOptions) -> Result<Self, TransportError> {
        let peer = addr
            .to_socket_addrs()
            .map_err(|e| TransportError::InvalidAddress(e.to_string()))?
            .next()
            .ok_or_else(|| TransportError::InvalidAddress("no address resolved".into()))?;

        let stream = TcpStream::connect_timeout(&peer, options.connect_timeout).map_err(|e| {
            TransportError::Connect {
                addr: peer.to_string(),
                source: e,
            }
        })?;
        Self::from_stream(stream, options)
    }

    /// 在已建立的连接上完成握手
    pub fn from_stream(mut stream: TcpStream, options: &TcpOptions) -> Result<Self, TransportError> {
        let peer = stream.peer_addr()?;
        configure_socket(&stream, options)?;

        let command = subscribe_command(&options.subscribe_topics);
        stream
            .write_all(command.as_bytes())
            .map_err(TransportError::Subscribe)?;
        debug!("[TcpFrameSource] {} subscribed: {}", peer, command.trim_end());

        stream
            .set_read_timeout(Some(options.handshake_timeout))
            .map_err(|e| TransportError::SocketOption {
                option: "SO_RCVTIMEO",
                source: e,
            })?;
        let mut reader = StreamFrameReader::new(stream).with_stall_timeout(options.stall_timeout);
        match reader.read_magic() {
            Ok(()) => {},
            // 握手阶段超时不能当作"暂无数据"
            Err(TransportError::Timeout) => {
                return Err(TransportError::Connect {
                    addr: peer.to_string(),
                    source: std::io::Error::from(std::io::ErrorKind::TimedOut),
                });
            },
            Err(e) => return Err(e),
        }

        Ok(Self {
            reader,
            peer,
            read_timeout: Some(options.handshake_timeout),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        // 0 对 set_read_timeout 无效
        let timeout = Some(timeout.max(Duration::from_millis(1)));
        if self.read_timeout != timeout {
            self.reader
                .get_ref()
                .set_read_timeout(timeout)
                .map_err(|e| TransportError::SocketOption {
                    option: "SO_RCVTIMEO",
                    source: e,
                })?;
            self.read_timeout = timeout;
        }
        Ok(())
    }
}

impl FrameSource for TcpFrameSource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<SourceEvent>, TransportError> {
        self.set_timeout(timeout)?;
        match self.reader.read_frame() {
            Ok(frame) => {
                trace!(
                    "[TcpFrameSource] frame idx={} type={} items={}",
                    frame.header.idx, frame.header.type_tag, frame.header.item_number
                );
                Ok(Some(frame_event(frame)))
            },
            Err(TransportError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

fn configure_socket(stream: &TcpStream, options: &TcpOptions) -> Result<(), TransportError> {
    if options.nodelay {
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::SocketOption {
                option: "TCP_NODELAY",
                source: e,
            })?;
    }

    #[cfg(target_os = "linux")]
    {
        use nix::sys::socket::{setsockopt, sockopt};

        if options.keepalive {
            setsockopt(stream, sockopt::KeepAlive, &true).map_err(|e| {
                TransportError::SocketOption {
                    option: "SO_KEEPALIVE",
                    source: e.into(),
                }
            })?;
        }
        if options.recv_buffer_size > 0 {
            setsockopt(stream, sockopt::RcvBuf, &options.recv_buffer_size).map_err(|e| {
                TransportError::SocketOption {
                    option: "SO_RCVBUF",
                    source: e.into(),
                }
            })?;
        }
    }

    Ok(())
}
