//! Builder 模式实现
//!
//! 根据型号选择解码变体、校验配置并链式构造 [`InnoDriver`]。
//! 型号不受支持或配置无效时不创建驱动。

use crate::config::DriverConfig;
use crate::dispatch::{Clock, FrameDispatcher};
use crate::driver::InnoDriver;
use crate::error::DriverError;
use crate::metrics::DriverMetrics;
use crate::records::{ImuRecord, PointCloudRecord, ScanRecord};
use crate::sink::RecordSink;
use inno_transport::{
    FrameSource, ReplayOptions, ReplaySource, TcpFrameSource, TcpOptions, UdpFrameSource,
    UdpOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 帧源工厂
///
/// 每次（重新）初始化时调用一次，返回新打开的帧源。
pub type SourceFactory =
    Box<dyn FnMut(&DriverConfig) -> Result<Box<dyn FrameSource>, DriverError> + Send>;

/// 投递线程单次等待事件的默认时长
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// 解码变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderVariant {
    /// `rev_` + {i, f, b, r, k}：转发状态字符串
    Falcon,
    /// `rev_` + {g, e, h}：回放需要标定文件
    Jaguar,
}

impl DecoderVariant {
    /// 按型号选择（不区分大小写）
    ///
    /// # Example
    ///
    /// ```
    /// use inno_driver::DecoderVariant;
    ///
    /// assert_eq!(DecoderVariant::select("REV_K").unwrap(), DecoderVariant::Falcon);
    /// assert_eq!(DecoderVariant::select("rev_e1").unwrap(), DecoderVariant::Jaguar);
    /// assert!(DecoderVariant::select("vlp16").is_err());
    /// ```
    pub fn select(model: &str) -> Result<Self, DriverError> {
        let lower = model.to_ascii_lowercase();
        let family = lower.strip_prefix("rev_").and_then(|rest| rest.chars().next());
        match family {
            Some('i' | 'f' | 'b' | 'r' | 'k') => Ok(Self::Falcon),
            Some('g' | 'e' | 'h') => Ok(Self::Jaguar),
            _ => Err(DriverError::UnsupportedModel(model.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Falcon => "Falcon",
            Self::Jaguar => "Jaguar",
        }
    }

    /// 状态字符串是否转发给分发器
    pub fn forwards_status(self) -> bool {
        self == Self::Falcon
    }

    /// 变体特有的配置要求
    pub fn check_config(self, config: &DriverConfig) -> Result<(), DriverError> {
        if self == Self::Jaguar && config.is_replay() && config.yaml_filename.is_empty() {
            return Err(DriverError::Configuration(
                "replay Jaguar raw data needs yaml_filename".into(),
            ));
        }
        Ok(())
    }
}

/// 按配置打开帧源：回放文件、UDP 或 TCP
pub fn open_source(config: &DriverConfig) -> Result<Box<dyn FrameSource>, DriverError> {
    if config.is_replay() {
        let options = ReplayOptions {
            speed: config.file_speed,
            rewind: config.file_rewind,
            skip_ms: config.file_skip_ms(),
        };
        return Ok(Box::new(ReplaySource::open(&config.data_filename, options)?));
    }
    if config.use_udp {
        let source = UdpFrameSource::bind(("0.0.0.0", config.lidar_udp_port), &UdpOptions::default())?;
        return Ok(Box::new(source));
    }
    let options = TcpOptions {
        subscribe_topics: config.subscribe_topics.clone(),
        ..TcpOptions::default()
    };
    let source = TcpFrameSource::connect((config.lidar_ip.as_str(), config.lidar_port), &options)?;
    Ok(Box::new(source))
}

/// InnoDriver Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use inno_driver::{ChannelSink, DriverConfig, InnoDriverBuilder, PointCloudRecord};
/// use std::sync::Arc;
///
/// let config = DriverConfig {
///     lidar_model: "rev_k".into(),
///     lidar_ip: "172.168.1.10".into(),
///     ..DriverConfig::default()
/// };
/// let (sink, points) = ChannelSink::<PointCloudRecord>::new(64);
/// let mut driver = InnoDriverBuilder::new(config)
///     .pointcloud_sink(Arc::new(sink))
///     .build()
///     .unwrap();
/// driver.start().unwrap();
/// let cloud = points.recv().unwrap();
/// println!("{} points", cloud.points.len());
/// driver.stop();
/// ```
pub struct InnoDriverBuilder {
    config: DriverConfig,
    scan_sink: Option<Arc<dyn RecordSink<ScanRecord>>>,
    pointcloud_sink: Option<Arc<dyn RecordSink<PointCloudRecord>>>,
    imu_sink: Option<Arc<dyn RecordSink<ImuRecord>>>,
    clock: Option<Arc<dyn Clock>>,
    source_factory: Option<SourceFactory>,
    poll_timeout: Duration,
}

impl InnoDriverBuilder {
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            scan_sink: None,
            pointcloud_sink: None,
            imu_sink: None,
            clock: None,
            source_factory: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    /// 扫描记录（极坐标）输出
    pub fn scan_sink(mut self, sink: Arc<dyn RecordSink<ScanRecord>>) -> Self {
        self.scan_sink = Some(sink);
        self
    }

    /// 点云记录输出
    pub fn pointcloud_sink(mut self, sink: Arc<dyn RecordSink<PointCloudRecord>>) -> Self {
        self.pointcloud_sink = Some(sink);
        self
    }

    /// IMU 记录输出
    pub fn imu_sink(mut self, sink: Arc<dyn RecordSink<ImuRecord>>) -> Self {
        self.imu_sink = Some(sink);
        self
    }

    /// 本地时钟（默认系统墙钟）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 自定义帧源（例如 SDK 回调桥接），默认按配置打开 TCP/UDP/回放
    pub fn source_factory<F>(mut self, factory: F) -> Self
    where
        F: FnMut(&DriverConfig) -> Result<Box<dyn FrameSource>, DriverError> + Send + 'static,
    {
        self.source_factory = Some(Box::new(factory));
        self
    }

    /// 投递线程单次等待事件的时长，也决定了 pause/stop 的响应延迟
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// 构建驱动（不打开帧源，`start()` 时延迟初始化）
    pub fn build(self) -> Result<InnoDriver, DriverError> {
        let variant = DecoderVariant::select(&self.config.lidar_model)?;
        self.config.validate()?;
        variant.check_config(&self.config)?;
        warn!("Init InnovusionDriver{}", variant.name());

        let config = Arc::new(self.config);
        let metrics = Arc::new(DriverMetrics::new());
        let mut dispatcher = FrameDispatcher::new(config.clone())?.with_metrics(metrics.clone());
        if let Some(clock) = self.clock {
            dispatcher = dispatcher.with_clock(clock);
        }
        if let Some(sink) = self.scan_sink {
            debug!("create scan channel {}", config.scan_channel);
            dispatcher = dispatcher.with_scan_sink(sink);
        }
        if let Some(sink) = self.pointcloud_sink {
            debug!("create pointcloud channel {}", config.pointcloud_channel);
            dispatcher = dispatcher.with_pointcloud_sink(sink);
        }
        if let Some(sink) = self.imu_sink {
            debug!("create imu channel {}", config.imu_channel);
            dispatcher = dispatcher.with_imu_sink(sink);
        }

        let factory = self
            .source_factory
            .unwrap_or_else(|| Box::new(|config: &DriverConfig| open_source(config)));

        Ok(InnoDriver::new(
            variant,
            config,
            Arc::new(dispatcher),
            metrics,
            factory,
            self.poll_timeout,
        ))
    }
}
