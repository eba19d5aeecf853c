//! 投递线程主循环
//!
//! 每个驱动句柄一个投递线程：从帧源拉取事件，按到达顺序交给分发器，
//! 告警驱动运行标志。

use crate::builder::DecoderVariant;
use crate::config::DriverConfig;
use crate::dispatch::FrameDispatcher;
use crate::metrics::DriverMetrics;
use crate::state::{AtomicDriverState, DriverState, RunSignal, RunState, evaluate_alarm};
use inno_protocol::AlarmMessage;
use inno_transport::{FrameSource, SourceEvent, TransportError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// 驱动线程间共享的上下文
pub struct DriverContext {
    pub config: Arc<DriverConfig>,
    pub variant: DecoderVariant,
    pub dispatcher: Arc<FrameDispatcher>,
    pub state: AtomicDriverState,
    pub run_signal: Arc<RunSignal>,
    pub metrics: Arc<DriverMetrics>,
}

impl DriverContext {
    /// 告警回调
    ///
    /// 按告警更新运行标志并唤醒所有等待者，返回生效的运行标志。
    pub fn on_alarm(&self, alarm: &AlarmMessage) -> RunState {
        self.metrics.alarms.fetch_add(1, Ordering::Relaxed);
        if alarm.level >= self.config.alarm_log_level() {
            warn!(
                "{} alarm level={:?} code={:?} source={}: {}",
                self.config.lidar_name, alarm.level, alarm.code, alarm.source_id, alarm.message
            );
        } else {
            debug!(
                "{} alarm level={:?} code={:?}: {}",
                self.config.lidar_name, alarm.level, alarm.code, alarm.message
            );
        }

        let requested = evaluate_alarm(alarm, self.config.is_replay());
        if requested == RunState::ErrorStop {
            self.state.set(DriverState::Error, Ordering::Release);
        }
        self.run_signal.signal(requested)
    }

    /// 处理单个事件
    pub fn handle_event(&self, event: SourceEvent) {
        match event {
            SourceEvent::Frame(frame) => {
                self.dispatcher.on_frame(&frame);
            },
            SourceEvent::Status(status) => {
                if self.variant.forwards_status() {
                    self.dispatcher.on_status(status.as_bytes());
                } else {
                    trace!("{} ignore status ({} bytes)", self.variant.name(), status.len());
                }
            },
            SourceEvent::Alarm(alarm) => {
                self.on_alarm(&alarm);
            },
        }
    }

    /// 帧源无法继续读取
    fn on_source_end(&self, err: &TransportError) {
        if matches!(err, TransportError::EndOfStream) && self.config.is_replay() {
            debug!("{} replay finished", self.config.lidar_name);
            self.run_signal.signal(RunState::GracefulStop);
            self.state.set(DriverState::Stopped, Ordering::Release);
            return;
        }
        error!(
            "{} source failed ({}): {}",
            self.config.lidar_name,
            err.code(),
            err
        );
        self.metrics.source_errors.fetch_add(1, Ordering::Relaxed);
        self.run_signal.signal(RunState::ErrorStop);
        self.state.set(DriverState::Error, Ordering::Release);
    }
}

/// 投递线程主循环
///
/// # 参数
/// - `source`: 帧源（线程独占）
/// - `ctx`: 共享上下文
/// - `poll_timeout`: 单次等待事件的时长
/// - `is_running`: 运行标志（用于生命周期联动）
///
/// # 返回
///
/// 因 `is_running` 被清除而退出时交还帧源（可继续使用）；
/// 帧源结束或出错时返回 `None`。
pub fn delivery_loop(
    mut source: Box<dyn FrameSource>,
    ctx: Arc<DriverContext>,
    poll_timeout: Duration,
    is_running: Arc<AtomicBool>,
) -> Option<Box<dyn FrameSource>> {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        use tracing::info;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Delivery thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set delivery thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    let describe = source.describe();
    debug!("Delivery thread started: {}", describe);

    loop {
        // Acquire: 看到 false 时也能看到停止方之前的所有写入
        if !is_running.load(Ordering::Acquire) {
            trace!("Delivery thread: is_running flag is false, exiting");
            return Some(source);
        }

        match source.next_event(poll_timeout) {
            Ok(Some(event)) => ctx.handle_event(event),
            Ok(None) => {
                ctx.metrics.source_timeouts.fetch_add(1, Ordering::Relaxed);
            },
            Err(TransportError::Timeout) => {
                ctx.metrics.source_timeouts.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) if e.is_recoverable() => {
                // 单帧结构错误：丢弃该帧，连接继续
                ctx.metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Dropped frame from {}: {}", describe, e);
            },
            Err(e) => {
                // 先清除运行标志，被唤醒的监督者才能立即重新 start()
                is_running.store(false, Ordering::Release);
                ctx.on_source_end(&e);
                return None;
            },
        }
    }
}
