//! 输出记录类型
//!
//! 每个输入帧产生一条扫描记录和/或一条点云记录，每个可识别的状态事件产生一条 IMU 记录。

use crate::config::ReflectanceMode;
use serde::{Deserialize, Serialize};

/// 记录头
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RecordHeader {
    /// 坐标系 id
    pub frame_id: String,
    /// 帧序号（`idx % u32::MAX`）
    pub sequence_num: u32,
    /// 雷达采集时间（纳秒，可能经过时间戳修正）
    pub lidar_timestamp_ns: u64,
    /// 发布时的墙钟时间（秒），写入通道前才填写
    pub timestamp_sec: f64,
}

/// 每帧公共字段
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameInfo {
    pub frame_id: String,
    pub idx: u64,
    /// 帧起始时间（秒）
    pub measurement_time: f64,
    pub frame_ns_start: u64,
    pub frame_ns_end: u64,
    pub model: String,
    pub source_id: u32,
    pub height: u32,
    /// 帧头声明的条目数
    pub width: u32,
    /// 点的 `intensity` 字段按哪种含义解读
    pub reflectance: ReflectanceMode,
}

/// 原生极坐标点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanPoint {
    /// 水平角（π/8192 rad）
    pub h_angle: f64,
    /// 垂直角（π/8192 rad）
    pub v_angle: f64,
    /// 半径（厘米）
    pub radius: f64,
    /// 绝对时间戳（纳秒）
    pub timestamp_ns: u64,
    pub intensity: u32,
    pub flags: u8,
    pub scan_id: u16,
    pub scan_idx: u16,
}

/// 笛卡尔点
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointXyzit {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// 绝对时间戳（纳秒）
    pub timestamp_ns: u64,
    pub intensity: u32,
    pub flags: u8,
    pub scan_id: u16,
    pub scan_idx: u16,
}

/// 扫描记录（极坐标）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScanRecord {
    pub header: RecordHeader,
    pub info: FrameInfo,
    pub points: Vec<ScanPoint>,
}

/// 点云记录（笛卡尔坐标）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloudRecord {
    pub header: RecordHeader,
    pub info: FrameInfo,
    pub points: Vec<PointXyzit>,
}

/// IMU 记录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImuReading {
    pub accel_x: i32,
    pub accel_y: i32,
    pub accel_z: i32,
    pub gyro_x: i32,
    pub gyro_y: i32,
    pub gyro_z: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImuRecord {
    pub header: RecordHeader,
    /// 本地接收时间（秒）
    pub measurement_time: f64,
    pub reading: ImuReading,
}
