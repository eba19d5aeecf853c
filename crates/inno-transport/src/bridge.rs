//! 回调桥接
//!
//! 传感器 SDK 在自己的线程上以推送回调的方式投递帧、状态和告警；
//! `CallbackBridge` 把这些回调转成 [`FrameSource`] 的拉取接口。
//!
//! - **Bounded Queue**: 防止消费端停滞时内存无限增长
//! - **非阻塞**: 回调中使用 `try_send`，队列满时丢弃并计数
//!
//! ```rust
//! use inno_transport::{CallbackBridge, FrameSource, SourceEvent};
//! use std::time::Duration;
//!
//! let (bridge, sender) = CallbackBridge::new(64);
//! sender.on_status("{}".to_string());
//!
//! let mut source = bridge;
//! let event = source.next_event(Duration::from_millis(10)).unwrap();
//! assert!(matches!(event, Some(SourceEvent::Status(_))));
//! ```

use crate::{FrameSource, SourceEvent, TransportError, frame_event};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use inno_protocol::{AlarmMessage, Frame, decode_frame};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

/// 默认队列容量
pub const DEFAULT_BRIDGE_CAPACITY: usize = 1024;

/// 回调侧句柄（可克隆，供 SDK 回调线程持有）
#[derive(Clone)]
pub struct BridgeSender {
    tx: Sender<SourceEvent>,
    dropped: Arc<AtomicU64>,
}

impl BridgeSender {
    fn push(&self, event: SourceEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n.is_power_of_two() {
                    warn!("[CallbackBridge] queue full, dropped {} events", n);
                }
                false
            },
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// 已解码帧回调
    pub fn on_frame(&self, frame: Frame) -> bool {
        self.push(frame_event(frame))
    }

    /// 原始帧回调
    ///
    /// 返回声明的条目数（与 SDK 回调的返回约定一致），解码失败返回负错误码。
    pub fn on_raw_frame(&self, source_id: u32, header: &[u8], items: &[u8]) -> i32 {
        match decode_frame(source_id, header, items) {
            Ok(frame) => {
                let n = frame.header.item_number;
                self.on_frame(frame);
                i32::try_from(n).unwrap_or(i32::MAX)
            },
            Err(e) => {
                warn!("[CallbackBridge] drop frame: {}", e);
                e.code()
            },
        }
    }

    /// 状态字符串回调
    pub fn on_status(&self, status: String) -> bool {
        self.push(SourceEvent::Status(status))
    }

    /// 告警回调
    pub fn on_alarm(&self, alarm: AlarmMessage) -> bool {
        self.push(SourceEvent::Alarm(alarm))
    }

    /// 丢弃的事件数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// 拉取侧（实现 `FrameSource`）
pub struct CallbackBridge {
    rx: Receiver<SourceEvent>,
    dropped: Arc<AtomicU64>,
}

impl CallbackBridge {
    /// 创建桥接，返回拉取侧和回调侧
    pub fn new(capacity: usize) -> (Self, BridgeSender) {
        let (tx, rx) = bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        (
            Self {
                rx,
                dropped: dropped.clone(),
            },
            BridgeSender { tx, dropped },
        )
    }

    /// 丢弃的事件数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSource for CallbackBridge {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<SourceEvent>, TransportError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // 所有回调侧句柄都已释放
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn describe(&self) -> String {
        String::from("sdk callback bridge")
    }
}
