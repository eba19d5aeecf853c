//! 状态字符串解析
//!
//! 传感器周期性上报 JSON 状态，其中只有 `get-gyroscope-xyz` 一项被转换为 IMU 记录。
//! 固件的状态格式并不稳定，JSON 解析失败被静默忽略；其他错误只记录日志，从不向上传播。

use crate::records::ImuReading;
use serde::Deserialize;
use thiserror::Error;
use tracing::{trace, warn};

/// IMU 状态键
pub const GYROSCOPE_KEY: &str = "get-gyroscope-xyz";

/// 状态解析错误
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// JSON 格式或字段类型错误
    #[error("Invalid status JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// 状态载荷不是 UTF-8
    #[error("Status payload is not UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

impl TelemetryError {
    /// 固件格式问题导致的错误，不需要记录日志
    pub fn is_silent(&self) -> bool {
        matches!(self, TelemetryError::Json(_))
    }
}

#[derive(Deserialize)]
struct GyroscopeXyz {
    accel_x: i32,
    accel_y: i32,
    accel_z: i32,
    gyro_x: i32,
    gyro_y: i32,
    gyro_z: i32,
}

impl From<GyroscopeXyz> for ImuReading {
    fn from(g: GyroscopeXyz) -> Self {
        Self {
            accel_x: g.accel_x,
            accel_y: g.accel_y,
            accel_z: g.accel_z,
            gyro_x: g.gyro_x,
            gyro_y: g.gyro_y,
            gyro_z: g.gyro_z,
        }
    }
}

/// 解析状态字符串
///
/// 返回 `Ok(None)` 表示状态中没有 IMU 数据。六个字段缺一不可，不产生部分记录。
pub fn parse_status(status: &str) -> Result<Option<ImuReading>, TelemetryError> {
    let value: serde_json::Value = serde_json::from_str(status)?;
    let Some(gyro) = value.get(GYROSCOPE_KEY) else {
        return Ok(None);
    };
    let gyro = GyroscopeXyz::deserialize(gyro)?;
    Ok(Some(gyro.into()))
}

/// 解析原始状态字节
pub fn parse_status_bytes(status: &[u8]) -> Result<Option<ImuReading>, TelemetryError> {
    parse_status(std::str::from_utf8(status)?)
}

/// 解析并吞掉错误
///
/// JSON 错误只在 trace 级别可见，其他错误以 warn 记录。
pub fn parse_status_lossy(status: &[u8]) -> Option<ImuReading> {
    match parse_status_bytes(status) {
        Ok(reading) => reading,
        Err(e) if e.is_silent() => {
            trace!("[Telemetry] ignore status: {}", e);
            None
        },
        Err(e) => {
            warn!("[Telemetry] {}", e);
            None
        },
    }
}
