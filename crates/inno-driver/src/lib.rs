//! 驱动层模块
//!
//! 本模块提供 Innovusion 激光雷达的驱动功能，包括：
//! - 坐标转换（精确 / 快速三角函数）
//! - 帧分发：紧凑点帧 → 扫描记录 / 点云记录，状态字符串 → IMU 记录
//! - 投递线程管理与生命周期状态机
//! - 告警驱动的运行标志（供监督者等待停止请求）
//!
//! # 使用场景
//!
//! 大多数用户应该使用 `inno-sdk` 提供的 prelude 和日志初始化；
//! 需要自定义帧源或输出时直接使用本 crate。

mod builder;
pub mod config;
pub mod conversion;
pub mod dispatch;
mod driver;
mod error;
pub mod metrics;
pub mod pipeline;
pub mod records;
pub mod sink;
pub mod state;
pub mod telemetry;

pub use builder::{
    DEFAULT_POLL_TIMEOUT, DecoderVariant, InnoDriverBuilder, SourceFactory, open_source,
};
pub use config::{DriverConfig, ReflectanceMode};
pub use conversion::{Cartesian, PointConverter, TrigMode, fast_cosine, fast_sine};
pub use dispatch::{Clock, FrameDispatcher, PolarSample, SystemClock, TimestampCorrection};
pub use driver::{InnoDriver, ShutdownHandle};
pub use error::DriverError;
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use pipeline::{DriverContext, delivery_loop};
pub use records::*;
pub use sink::{ChannelSink, RecordSink};
pub use state::*;
pub use telemetry::{GYROSCOPE_KEY, TelemetryError, parse_status, parse_status_lossy};
