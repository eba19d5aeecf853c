//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use inno_sdk::prelude::*;
//! ```

// 驱动层
pub use crate::driver::{
    ChannelSink, DecoderVariant, DriverConfig, DriverState, InnoDriver, InnoDriverBuilder,
    RecordSink, ReflectanceMode, RunState, ShutdownHandle, TrigMode,
};

// 输出记录
pub use crate::driver::{ImuRecord, PointCloudRecord, PointXyzit, ScanPoint, ScanRecord};

// 帧源
pub use crate::transport::{CallbackBridge, FrameSource, SourceEvent};

// 错误类型
pub use crate::driver::DriverError;
pub use crate::protocol::ProtocolError;
pub use crate::transport::TransportError;
