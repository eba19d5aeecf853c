//! 输出通道抽象
//!
//! 发布/订阅总线在本 crate 之外，这里只定义写入接口：
//! 接收一条已完成的记录，无返回值，写入必须是非阻塞的。
//!
//! # 使用示例
//!
//! ```rust
//! use inno_driver::records::ImuRecord;
//! use inno_driver::sink::{ChannelSink, RecordSink};
//! use std::sync::Arc;
//!
//! let (sink, rx) = ChannelSink::<ImuRecord>::new(16);
//! sink.write(Arc::new(ImuRecord::default()));
//! assert!(rx.try_recv().is_ok());
//! ```

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// 记录写入端
///
/// 在投递线程上被调用，实现不得阻塞。
pub trait RecordSink<T>: Send + Sync {
    fn write(&self, record: Arc<T>);
}

impl<T, F> RecordSink<T> for F
where
    F: Fn(Arc<T>) + Send + Sync,
{
    fn write(&self, record: Arc<T>) {
        self(record)
    }
}

/// 有界通道写入端
///
/// 队列满时丢弃记录并计数，不阻塞投递线程。
pub struct ChannelSink<T> {
    name: String,
    tx: Sender<Arc<T>>,
    dropped: Arc<AtomicU64>,
    written: Arc<AtomicU64>,
}

impl<T> ChannelSink<T> {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, Receiver<Arc<T>>) {
        Self::named("channel", capacity)
    }

    /// 带通道名（用于日志）
    #[must_use]
    pub fn named(name: impl Into<String>, capacity: usize) -> (Self, Receiver<Arc<T>>) {
        let (tx, rx) = bounded(capacity.max(1));
        let sink = Self {
            name: name.into(),
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            written: Arc::new(AtomicU64::new(0)),
        };
        (sink, rx)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 丢弃的记录数
    pub fn dropped(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }

    /// 成功写入的记录数
    pub fn written(&self) -> &Arc<AtomicU64> {
        &self.written
    }
}

impl<T: Send + Sync> RecordSink<T> for ChannelSink<T> {
    fn write(&self, record: Arc<T>) {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            },
            Err(TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n.is_power_of_two() {
                    warn!("[ChannelSink] {} full, dropped {} records", self.name, n);
                }
            },
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}
