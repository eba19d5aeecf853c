//! 驱动对外 API
//!
//! [`InnoDriver`] 持有一个帧源和一个投递线程：
//!
//! - `start()`：未初始化时先打开帧源，再启动投递线程
//! - `pause()`：停止投递线程，帧源保持打开
//! - `stop()`：停止投递并释放帧源，句柄归零（可重复调用）
//!
//! 告警只更新运行标志，不会自行停止驱动；由监督者通过
//! [`InnoDriver::wait_for_stop`] 等待停止请求后调用 `stop()` 并重新打开。

use crate::builder::{DecoderVariant, SourceFactory};
use crate::config::DriverConfig;
use crate::dispatch::FrameDispatcher;
use crate::error::DriverError;
use crate::metrics::{DriverMetrics, MetricsSnapshot};
use crate::pipeline::{DriverContext, delivery_loop};
use crate::state::{AtomicDriverState, DriverState, RunSignal, RunState};
use inno_protocol::AlarmMessage;
use inno_transport::FrameSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// 句柄分配器，0 保留表示"未打开"
static NEXT_HANDLE: AtomicU32 = AtomicU32::new(1);

/// 等待投递线程退出的上限
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 带超时的 join，成功时返回线程的返回值
trait JoinTimeout<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<T>;
}

impl<T: Send + 'static> JoinTimeout<T> for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<T> {
        use crossbeam_channel::{RecvTimeoutError, bounded};

        let (tx, rx) = bounded(1);

        // 看门狗线程负责 join，超时后它继续等待，不影响调用方
        std::thread::spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result,
            Err(RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 协作式停止请求
///
/// 可在任意线程（例如信号处理线程）调用，只设置运行标志并唤醒等待者。
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    signal: Arc<RunSignal>,
}

impl ShutdownHandle {
    /// 请求正常停止
    pub fn request_stop(&self) {
        self.signal.signal(RunState::GracefulStop);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.signal.get().is_stop()
    }
}

/// Innovusion 雷达驱动
///
/// 由 [`InnoDriverBuilder`](crate::InnoDriverBuilder) 构建。
pub struct InnoDriver {
    ctx: Arc<DriverContext>,
    /// 帧源句柄，0 表示未打开
    handle: u32,
    /// 暂停或尚未启动时持有的帧源
    source: Option<Box<dyn FrameSource>>,
    delivery_thread: Option<JoinHandle<Option<Box<dyn FrameSource>>>>,
    is_running: Arc<AtomicBool>,
    factory: SourceFactory,
    poll_timeout: Duration,
}

impl InnoDriver {
    pub(crate) fn new(
        variant: DecoderVariant,
        config: Arc<DriverConfig>,
        dispatcher: Arc<FrameDispatcher>,
        metrics: Arc<DriverMetrics>,
        factory: SourceFactory,
        poll_timeout: Duration,
    ) -> Self {
        let ctx = DriverContext {
            config,
            variant,
            dispatcher,
            state: AtomicDriverState::new(DriverState::Uninitialized),
            run_signal: Arc::new(RunSignal::new()),
            metrics,
        };
        Self {
            ctx: Arc::new(ctx),
            handle: 0,
            source: None,
            delivery_thread: None,
            is_running: Arc::new(AtomicBool::new(false)),
            factory,
            poll_timeout,
        }
    }

    /// 打开帧源（不启动投递）
    ///
    /// 已打开时为空操作；投递线程运行中返回 [`DriverError::AlreadyRunning`]。
    pub fn init(&mut self) -> Result<(), DriverError> {
        if self.is_streaming() {
            return Err(DriverError::AlreadyRunning);
        }
        self.reap_delivery_thread();
        if self.source.is_none() {
            let source = self.open_source()?;
            self.source = Some(source);
        }
        Ok(())
    }

    fn open_source(&mut self) -> Result<Box<dyn FrameSource>, DriverError> {
        self.ctx
            .state
            .set(DriverState::Initializing, Ordering::Release);
        match (self.factory)(&self.ctx.config) {
            Ok(source) => {
                self.handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
                info!(
                    "{} open {} (handle {})",
                    self.ctx.config.lidar_name,
                    source.describe(),
                    self.handle
                );
                Ok(source)
            },
            Err(e) => {
                error!("{} cannot open source: {}", self.ctx.config.lidar_name, e);
                self.handle = 0;
                self.ctx.state.set(DriverState::Error, Ordering::Release);
                Err(e)
            },
        }
    }

    /// 开始投递
    ///
    /// 未初始化时先打开帧源；已在运行时为空操作。返回真实的打开结果。
    pub fn start(&mut self) -> Result<(), DriverError> {
        if self.is_streaming() {
            return Ok(());
        }
        self.reap_delivery_thread();
        let source = match self.source.take() {
            Some(source) => source,
            None => self.open_source()?,
        };

        self.ctx.run_signal.reset();
        self.is_running.store(true, Ordering::Release);

        let ctx = self.ctx.clone();
        let is_running = self.is_running.clone();
        let poll_timeout = self.poll_timeout;
        let spawned = std::thread::Builder::new()
            .name(format!("inno-delivery-{}", self.handle))
            .spawn(move || delivery_loop(source, ctx, poll_timeout, is_running));

        match spawned {
            Ok(thread) => {
                self.delivery_thread = Some(thread);
                self.ctx
                    .state
                    .set(DriverState::Streaming, Ordering::Release);
                info!(
                    "{} start, handle {}",
                    self.ctx.config.lidar_name, self.handle
                );
                Ok(())
            },
            Err(e) => {
                // 帧源随闭包一起释放
                self.is_running.store(false, Ordering::Release);
                self.handle = 0;
                self.ctx.state.set(DriverState::Error, Ordering::Release);
                Err(DriverError::DeliveryThread(e.to_string()))
            },
        }
    }

    /// 暂停投递，帧源保持打开
    pub fn pause(&mut self) {
        if self.delivery_thread.is_none() {
            return;
        }
        self.reap_delivery_thread();
        if self.source.is_some() {
            self.ctx.state.set(DriverState::Paused, Ordering::Release);
            debug!("{} paused", self.ctx.config.lidar_name);
        }
    }

    /// 停止投递并释放帧源（可重复调用）
    pub fn stop(&mut self) {
        self.reap_delivery_thread();
        if let Some(source) = self.source.take() {
            debug!("close {}", source.describe());
        }
        if self.handle != 0 {
            info!(
                "{} stop, handle {}",
                self.ctx.config.lidar_name, self.handle
            );
        }
        self.handle = 0;
        self.ctx.run_signal.reset();
        self.ctx.state.set(DriverState::Stopped, Ordering::Release);
    }

    /// 通知投递线程退出并回收帧源
    fn reap_delivery_thread(&mut self) {
        // Release: 确保之前的写入对投递线程可见
        self.is_running.store(false, Ordering::Release);
        let Some(thread) = self.delivery_thread.take() else {
            return;
        };
        match thread.join_timeout(JOIN_TIMEOUT) {
            Ok(Some(source)) => self.source = Some(source),
            Ok(None) => {
                // 帧源已结束或出错，下次 start() 重新打开
                debug!("{} source released", self.ctx.config.lidar_name);
                self.handle = 0;
            },
            Err(_e) => {
                error!(
                    "Delivery thread panicked or failed to shut down within {:?}",
                    JOIN_TIMEOUT
                );
                self.handle = 0;
            },
        }
    }

    /// 投递线程是否在运行
    pub fn is_streaming(&self) -> bool {
        self.delivery_thread.is_some() && self.is_running.load(Ordering::Acquire)
    }

    /// 等待停止请求（告警或 [`ShutdownHandle`]），超时返回 `None`
    pub fn wait_for_stop(&self, timeout: Duration) -> Option<RunState> {
        self.ctx.run_signal.wait_for_stop(timeout)
    }

    /// 注入告警（与帧源上报的告警走同一路径）
    pub fn on_alarm(&self, alarm: &AlarmMessage) -> RunState {
        self.ctx.on_alarm(alarm)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            signal: self.ctx.run_signal.clone(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.ctx.state.get(Ordering::Acquire)
    }

    pub fn run_state(&self) -> RunState {
        self.ctx.run_signal.get()
    }

    /// 帧源句柄，0 表示未打开
    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn variant(&self) -> DecoderVariant {
        self.ctx.variant
    }

    pub fn config(&self) -> &Arc<DriverConfig> {
        &self.ctx.config
    }

    pub fn dispatcher(&self) -> &Arc<FrameDispatcher> {
        &self.ctx.dispatcher
    }

    /// 指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }
}

impl Drop for InnoDriver {
    fn drop(&mut self) {
        if self.handle != 0 || self.delivery_thread.is_some() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::InnoDriverBuilder;
    use crate::records::{ImuRecord, PointCloudRecord};
    use crate::sink::ChannelSink;
    use crossbeam_channel::{Receiver, unbounded};
    use inno_protocol::{
        AlarmCode, AlarmLevel, CompactPoint, CompactPointFields, Frame, FrameHeader,
    };
    use inno_transport::{BridgeSender, CallbackBridge, TransportError};

    const WAIT: Duration = Duration::from_secs(2);

    fn config(model: &str) -> DriverConfig {
        DriverConfig {
            lidar_model: model.into(),
            ..DriverConfig::default()
        }
    }

    fn frame(idx: u64, n: usize) -> Frame {
        let points = (0..n)
            .map(|i| {
                CompactPoint::from_fields(CompactPointFields {
                    radius: 1000 + i as u16,
                    ..Default::default()
                })
            })
            .collect();
        Frame::from_compact_points(
            0,
            FrameHeader {
                idx,
                ts_us_start: 1_600_000_000_000_000.0,
                ..FrameHeader::default()
            },
            points,
        )
    }

    /// 每次打开都创建新的桥接，回调侧句柄通过通道交给测试
    fn bridge_driver(
        model: &str,
    ) -> (
        InnoDriver,
        Receiver<BridgeSender>,
        Receiver<Arc<PointCloudRecord>>,
    ) {
        let (sender_tx, sender_rx) = unbounded();
        let (sink, records) = ChannelSink::<PointCloudRecord>::new(16);
        let driver = InnoDriverBuilder::new(config(model))
            .pointcloud_sink(Arc::new(sink))
            .poll_timeout(Duration::from_millis(10))
            .source_factory(move |_| {
                let (bridge, sender) = CallbackBridge::new(64);
                sender_tx
                    .send(sender)
                    .map_err(|e| DriverError::Configuration(e.to_string()))?;
                Ok(Box::new(bridge) as Box<dyn FrameSource>)
            })
            .build()
            .unwrap();
        (driver, sender_rx, records)
    }

    #[test]
    fn test_start_delivers_frames() {
        let (mut driver, senders, records) = bridge_driver("rev_k");
        assert_eq!(driver.state(), DriverState::Uninitialized);

        driver.start().unwrap();
        assert!(driver.is_streaming());
        assert_ne!(driver.handle(), 0);
        assert_eq!(driver.state(), DriverState::Streaming);

        let sender = senders.recv_timeout(WAIT).unwrap();
        assert!(sender.on_frame(frame(7, 3)));
        let record = records.recv_timeout(WAIT).unwrap();
        assert_eq!(record.info.idx, 7);
        assert_eq!(record.info.width, 3);
        assert_eq!(record.points.len(), 3);

        driver.stop();
        assert_eq!(driver.handle(), 0);
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(driver.metrics().frames_dispatched, 1);
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut driver, senders, _records) = bridge_driver("rev_k");
        driver.start().unwrap();
        let handle = driver.handle();
        driver.start().unwrap();
        assert_eq!(driver.handle(), handle);
        // 只打开了一次
        assert!(senders.recv_timeout(WAIT).is_ok());
        assert!(senders.try_recv().is_err());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let (mut driver, _senders, _records) = bridge_driver("rev_k");
        driver.stop();
        driver.stop();
        assert_eq!(driver.handle(), 0);

        driver.start().unwrap();
        driver.stop();
        driver.stop();
        assert_eq!(driver.handle(), 0);
        assert_eq!(driver.state(), DriverState::Stopped);
    }

    #[test]
    fn test_pause_keeps_source() {
        let (mut driver, senders, records) = bridge_driver("rev_k");
        driver.start().unwrap();
        let handle = driver.handle();
        let sender = senders.recv_timeout(WAIT).unwrap();

        driver.pause();
        assert_eq!(driver.state(), DriverState::Paused);
        assert_eq!(driver.handle(), handle);
        assert!(!driver.is_streaming());

        // 暂停期间的帧留在桥接中，恢复后按顺序投递
        assert!(sender.on_frame(frame(1, 1)));
        assert!(sender.on_frame(frame(2, 1)));
        assert!(records.recv_timeout(Duration::from_millis(50)).is_err());

        driver.start().unwrap();
        assert_eq!(driver.handle(), handle);
        assert_eq!(records.recv_timeout(WAIT).unwrap().info.idx, 1);
        assert_eq!(records.recv_timeout(WAIT).unwrap().info.idx, 2);
        assert!(senders.try_recv().is_err());
    }

    #[test]
    fn test_init_then_start() {
        let (mut driver, senders, _records) = bridge_driver("rev_e");
        driver.init().unwrap();
        assert_ne!(driver.handle(), 0);
        assert_eq!(driver.state(), DriverState::Initializing);
        driver.init().unwrap();
        assert!(senders.recv_timeout(WAIT).is_ok());
        assert!(senders.try_recv().is_err());

        driver.start().unwrap();
        assert!(matches!(driver.init(), Err(DriverError::AlreadyRunning)));
    }

    #[test]
    fn test_start_propagates_open_failure() {
        let mut driver = InnoDriverBuilder::new(config("rev_k"))
            .source_factory(|_| Err(TransportError::Disconnected.into()))
            .build()
            .unwrap();
        let err = driver.start().unwrap_err();
        assert!(matches!(err, DriverError::Transport(TransportError::Disconnected)));
        assert_eq!(driver.handle(), 0);
        assert_eq!(driver.state(), DriverState::Error);
        assert!(!driver.is_streaming());
    }

    #[test]
    fn test_start_tcp_connect_refused() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut driver = InnoDriverBuilder::new(DriverConfig {
            lidar_ip: "127.0.0.1".into(),
            lidar_port: port,
            ..config("rev_k")
        })
        .build()
        .unwrap();
        assert!(driver.start().is_err());
        assert_eq!(driver.handle(), 0);
    }

    #[test]
    fn test_critical_alarm_requests_error_stop() {
        let (mut driver, senders, _records) = bridge_driver("rev_k");
        driver.start().unwrap();
        let sender = senders.recv_timeout(WAIT).unwrap();

        assert!(sender.on_alarm(AlarmMessage::new(
            AlarmLevel::Warning,
            AlarmCode::SlowNetwork,
            "slow"
        )));
        assert!(sender.on_alarm(AlarmMessage::new(
            AlarmLevel::Critical,
            AlarmCode::SensorError,
            "laser fault"
        )));
        assert_eq!(driver.wait_for_stop(WAIT), Some(RunState::ErrorStop));
        assert_eq!(driver.state(), DriverState::Error);
        assert_eq!(driver.metrics().alarms, 2);

        // 监督者负责停止并重新打开
        driver.stop();
        assert_eq!(driver.run_state(), RunState::Idle);
        driver.start().unwrap();
        assert!(senders.recv_timeout(WAIT).is_ok());
        assert_eq!(driver.run_state(), RunState::Idle);
    }

    #[test]
    fn test_disconnect_ends_delivery_and_reopens() {
        let (mut driver, senders, _records) = bridge_driver("rev_k");
        driver.start().unwrap();
        let first = driver.handle();
        drop(senders.recv_timeout(WAIT).unwrap());

        assert_eq!(driver.wait_for_stop(WAIT), Some(RunState::ErrorStop));
        assert_eq!(driver.metrics().source_errors, 1);

        // 投递线程已退出，再次 start 会重新打开帧源
        driver.start().unwrap();
        assert!(senders.recv_timeout(WAIT).is_ok());
        assert_ne!(driver.handle(), first);
        assert_eq!(driver.state(), DriverState::Streaming);
    }

    #[test]
    fn test_shutdown_handle() {
        let (mut driver, _senders, _records) = bridge_driver("rev_k");
        driver.start().unwrap();
        let shutdown = driver.shutdown_handle();
        assert!(!shutdown.is_stop_requested());

        let requester = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            shutdown.request_stop();
            shutdown
        });
        assert_eq!(driver.wait_for_stop(WAIT), Some(RunState::GracefulStop));
        let shutdown = requester.join().unwrap();
        assert!(shutdown.is_stop_requested());

        driver.stop();
        assert!(!shutdown.is_stop_requested());
    }

    #[test]
    fn test_falcon_status_produces_imu() {
        let (sender_tx, senders) = unbounded();
        let (sink, imu) = ChannelSink::<ImuRecord>::new(4);
        let mut driver = InnoDriverBuilder::new(config("rev_f"))
            .imu_sink(Arc::new(sink))
            .poll_timeout(Duration::from_millis(10))
            .source_factory(move |_| {
                let (bridge, sender) = CallbackBridge::new(8);
                let _ = sender_tx.send(sender);
                Ok(Box::new(bridge) as Box<dyn FrameSource>)
            })
            .build()
            .unwrap();
        driver.start().unwrap();

        let sender: BridgeSender = senders.recv_timeout(WAIT).unwrap();
        assert!(sender.on_status(
            r#"{"get-gyroscope-xyz": {"accel_x": 1, "accel_y": 2, "accel_z": 3,
                "gyro_x": 4, "gyro_y": 5, "gyro_z": 6}}"#
                .to_string()
        ));
        let record = imu.recv_timeout(WAIT).unwrap();
        assert_eq!(record.reading.gyro_z, 6);
        assert_eq!(driver.metrics().imu_records, 1);
    }

    #[test]
    fn test_drop_stops_delivery_thread() {
        let (mut driver, senders, _records) = bridge_driver("rev_k");
        driver.start().unwrap();
        let sender = senders.recv_timeout(WAIT).unwrap();
        drop(driver);
        // 帧源已释放，回调侧发送失败
        assert!(!sender.on_frame(frame(1, 1)));
    }
}
