//! 驱动层错误类型定义

use inno_protocol::ProtocolError;
use inno_transport::TransportError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误（连接、读取、帧结构）
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置无效或缺失必填字段（初始化失败，不创建驱动）
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 不支持的雷达型号
    #[error("Unsupported lidar model: {0}")]
    UnsupportedModel(String),

    /// 配置文件读取失败
    #[error("Cannot read config file {path}: {source}")]
    ConfigFile {
        path: String,
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[error("Invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// 投递线程已在运行
    #[error("Driver already running")]
    AlreadyRunning,

    /// 投递线程错误
    #[error("Delivery thread error: {0}")]
    DeliveryThread(String),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}

impl DriverError {
    /// 负错误码
    ///
    /// 传输与协议错误沿用下层的错误码，驱动自身的错误使用 -200 以下的区间。
    pub fn code(&self) -> i32 {
        match self {
            DriverError::Transport(e) => e.code(),
            DriverError::Protocol(e) => e.code(),
            DriverError::Configuration(_) => -201,
            DriverError::UnsupportedModel(_) => -202,
            DriverError::ConfigFile { .. } => -203,
            DriverError::Toml(_) => -204,
            DriverError::AlreadyRunning => -205,
            DriverError::DeliveryThread(_) => -206,
            DriverError::Timeout => -207,
        }
    }

    /// 是否为初始化阶段的配置类错误
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DriverError::Configuration(_)
                | DriverError::UnsupportedModel(_)
                | DriverError::ConfigFile { .. }
                | DriverError::Toml(_)
        )
    }
}
