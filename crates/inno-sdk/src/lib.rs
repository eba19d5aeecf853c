//! Inno SDK - Innovusion 激光雷达 Rust 驱动
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): cframe 帧头、条目类型、CRC32 校验
//! - **传输层** (`transport`): TCP 字节流、UDP 数据报、录制文件回放、回调桥接
//! - **驱动层** (`driver`): 坐标转换、帧分发、投递线程与生命周期
//!
//! # 快速开始
//!
//! ```no_run
//! use inno_sdk::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! inno_sdk::init_logger();
//!
//! let config = DriverConfig::load("inno.toml").unwrap();
//! let (sink, points) = ChannelSink::<PointCloudRecord>::new(64);
//! let mut driver = InnoDriverBuilder::new(config)
//!     .pointcloud_sink(Arc::new(sink))
//!     .build()
//!     .unwrap();
//! driver.start().unwrap();
//!
//! // 监督循环：等待告警触发的停止请求
//! loop {
//!     while let Ok(cloud) = points.try_recv() {
//!         println!("frame {} with {} points", cloud.info.idx, cloud.points.len());
//!     }
//!     match driver.wait_for_stop(Duration::from_millis(100)) {
//!         Some(RunState::GracefulStop) => break,
//!         Some(_) => {
//!             driver.stop();
//!             driver.start().unwrap();
//!         },
//!         None => {},
//!     }
//! }
//! driver.stop();
//! ```

use std::path::Path;
use tracing_subscriber::EnvFilter;

pub use inno_driver as driver;
pub use inno_protocol as protocol;
pub use inno_transport as transport;

pub mod prelude;

// --- 用户以此为界 ---

pub use driver::{
    DecoderVariant, DriverConfig, DriverError, DriverState, InnoDriver, InnoDriverBuilder,
    MetricsSnapshot, RunState, ShutdownHandle,
};
pub use protocol::ProtocolError;
pub use transport::TransportError;

/// 默认日志过滤
pub const DEFAULT_LOG_FILTER: &str = "info";

/// 初始化日志（`RUST_LOG` 优先，默认 `info`）
///
/// 同时把 `log` 宏桥接到 `tracing`。已经设置过全局 subscriber 时返回 `false`，不会 panic。
pub fn init_logger() -> bool {
    init_logger_with(DEFAULT_LOG_FILTER)
}

/// 以给定的默认过滤初始化日志
pub fn init_logger_with(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return false;
    }
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::debug!("log facade already bridged: {}", e);
    }
    true
}

/// 从 TOML 文件加载配置并创建 Builder
pub fn builder_from_file(path: impl AsRef<Path>) -> Result<InnoDriverBuilder, DriverError> {
    let config = DriverConfig::load(path)?;
    Ok(InnoDriverBuilder::new(config))
}
