//! 驱动性能指标
//!
//! 原子计数器，投递线程写入，任意线程读取快照，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 驱动实时指标
///
/// # 使用示例
///
/// ```rust
/// use inno_driver::DriverMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(DriverMetrics::default());
/// metrics.frames_received.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.frames_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 收到的帧数（所有类型）
    pub frames_received: AtomicU64,

    /// 产生了输出记录的紧凑点帧数
    pub frames_dispatched: AtomicU64,

    /// 因结构错误被丢弃的帧数
    pub frames_dropped: AtomicU64,

    /// 非紧凑点类型、被忽略的帧数
    pub frames_ignored: AtomicU64,

    /// 发布的点数（点云通道）
    pub points_published: AtomicU64,

    /// 因 NaN 被丢弃的点数
    pub nan_points_dropped: AtomicU64,

    /// 收到的状态字符串数
    pub status_events: AtomicU64,

    /// 发布的 IMU 记录数
    pub imu_records: AtomicU64,

    /// 收到的告警数
    pub alarms: AtomicU64,

    /// 时间戳修正次数
    pub timestamp_corrections: AtomicU64,

    /// 帧源读取超时次数（无数据时正常出现）
    pub source_timeouts: AtomicU64,

    /// 帧源错误次数
    pub source_errors: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取所有计数器
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dispatched: self.frames_dispatched.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_ignored: self.frames_ignored.load(Ordering::Relaxed),
            points_published: self.points_published.load(Ordering::Relaxed),
            nan_points_dropped: self.nan_points_dropped.load(Ordering::Relaxed),
            status_events: self.status_events.load(Ordering::Relaxed),
            imu_records: self.imu_records.load(Ordering::Relaxed),
            alarms: self.alarms.load(Ordering::Relaxed),
            timestamp_corrections: self.timestamp_corrections.load(Ordering::Relaxed),
            source_timeouts: self.source_timeouts.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        for counter in [
            &self.frames_received,
            &self.frames_dispatched,
            &self.frames_dropped,
            &self.frames_ignored,
            &self.points_published,
            &self.nan_points_dropped,
            &self.status_events,
            &self.imu_records,
            &self.alarms,
            &self.timestamp_corrections,
            &self.source_timeouts,
            &self.source_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_dispatched: u64,
    pub frames_dropped: u64,
    pub frames_ignored: u64,
    pub points_published: u64,
    pub nan_points_dropped: u64,
    pub status_events: u64,
    pub imu_records: u64,
    pub alarms: u64,
    pub timestamp_corrections: u64,
    pub source_timeouts: u64,
    pub source_errors: u64,
}

impl MetricsSnapshot {
    /// 被丢弃的帧占比
    pub fn frame_drop_rate(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        self.frames_dropped as f64 / self.frames_received as f64 * 100.0
    }
}
