//! 驱动配置
//!
//! 启动时从 TOML 构造一次，之后不可变（以 `Arc<DriverConfig>` 共享）。
//!
//! ```toml
//! lidar_name = "front"
//! frame_id = "innovusion"
//! lidar_model = "REV_K"
//! lidar_ip = "172.168.1.10"
//! lidar_port = 8010
//! time_fix_err_ms = 100
//! pointcloud_channel = "/apollo/sensor/innovusion/PointCloud2"
//! ```

use crate::conversion::TrigMode;
use crate::error::DriverError;
use inno_protocol::AlarmLevel;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 强度字段含义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectanceMode {
    Intensity,
    #[default]
    Reflectivity,
}

/// 驱动配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// 雷达名称（日志和描述用）
    pub lidar_name: String,
    /// 输出记录的坐标系 id
    pub frame_id: String,
    /// 输出记录的来源 id
    pub lidar_id: u32,
    /// 型号字符串，用于选择解码变体
    pub lidar_model: String,

    pub lidar_ip: String,
    pub lidar_port: u16,
    /// UDP 模式下本地绑定的端口
    pub lidar_udp_port: u16,
    pub use_udp: bool,
    /// TCP 订阅主题，空表示全部
    pub subscribe_topics: Vec<u32>,

    /// 回放文件，非空时代替实时连接
    pub data_filename: String,
    /// 标定文件（部分型号回放时必需）
    pub yaml_filename: String,
    /// 回放速度倍率，0 表示不限速
    pub file_speed: f64,
    /// 额外回放次数，负数表示无限循环
    pub file_rewind: i32,
    /// 跳过文件开头的秒数
    pub file_skip: u64,

    pub reflectance: ReflectanceMode,

    /// 时间戳修正阈值（毫秒）：0 不修正，负数总是修正
    pub time_fix_err_ms: i64,
    /// 0 = 精确三角函数，1 = 快速近似
    pub enable_fast_sin_cos: i32,
    /// 达到该级别的告警以 warn 记录
    pub inno_log_level: u32,

    /// 输出通道名，空表示不创建
    pub scan_channel: String,
    pub pointcloud_channel: String,
    pub imu_channel: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            lidar_name: String::from("innovusion"),
            frame_id: String::from("innovusion"),
            lidar_id: 0,
            lidar_model: String::new(),
            lidar_ip: String::from("172.168.1.10"),
            lidar_port: 8010,
            lidar_udp_port: 8010,
            use_udp: false,
            subscribe_topics: Vec::new(),
            data_filename: String::new(),
            yaml_filename: String::new(),
            file_speed: 1.0,
            file_rewind: 0,
            file_skip: 0,
            reflectance: ReflectanceMode::default(),
            time_fix_err_ms: 0,
            enable_fast_sin_cos: 0,
            inno_log_level: 1,
            scan_channel: String::new(),
            pointcloud_channel: String::new(),
            imu_channel: String::new(),
        }
    }
}

impl DriverConfig {
    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(s: &str) -> Result<Self, DriverError> {
        let config: DriverConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DriverError::ConfigFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        toml::to_string(self).map_err(|e| DriverError::Configuration(e.to_string()))
    }

    /// 校验必填字段与取值范围
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.lidar_model.trim().is_empty() {
            return Err(DriverError::Configuration("lidar_model is empty".into()));
        }
        TrigMode::from_i32(self.enable_fast_sin_cos)?;
        if !self.file_speed.is_finite() || self.file_speed < 0.0 {
            return Err(DriverError::Configuration(format!(
                "file_speed must be >= 0, got {}",
                self.file_speed
            )));
        }
        if !self.is_replay() {
            if self.use_udp {
                if self.lidar_udp_port == 0 {
                    return Err(DriverError::Configuration("lidar_udp_port is 0".into()));
                }
            } else {
                if self.lidar_ip.trim().is_empty() {
                    return Err(DriverError::Configuration("lidar_ip is empty".into()));
                }
                if self.lidar_port == 0 {
                    return Err(DriverError::Configuration("lidar_port is 0".into()));
                }
            }
        }
        Ok(())
    }

    /// 是否为文件回放
    pub fn is_replay(&self) -> bool {
        !self.data_filename.is_empty()
    }

    pub fn trig_mode(&self) -> Result<TrigMode, DriverError> {
        TrigMode::from_i32(self.enable_fast_sin_cos)
    }

    /// 告警日志级别
    pub fn alarm_log_level(&self) -> AlarmLevel {
        AlarmLevel::from(self.inno_log_level)
    }

    /// 回放跳过时长（毫秒）
    pub fn file_skip_ms(&self) -> u64 {
        self.file_skip.saturating_mul(1000)
    }
}
