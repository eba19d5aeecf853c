//! 非点类型条目：包围盒、文本、告警

use crate::{ProtocolError, c_string, ensure_len};
use bytes::{Buf, BufMut};

/// 包围盒大小（字节）
pub const BOUNDING_BOX_SIZE: usize = 236;
/// 文本条目大小（字节）
pub const TEXT_ITEM_SIZE: usize = 160;
/// 告警消息大小（字节）
pub const ALARM_MESSAGE_SIZE: usize = 296;

const TEXT_LEN: usize = 64;
const ALARM_TEXT_LEN: usize = 256;
const BBOX_RESERVED2_LEN: usize = 16;
const TEXT_RESERVED_LEN: usize = 16;

// ============================================================================
// 告警
// ============================================================================

/// 告警级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum AlarmLevel {
    #[default]
    No = 0,
    Warning = 1,
    Error = 2,
    Critical = 3,
    Fatal = 4,
}

/// 未知的更高级别按 Fatal 处理
impl From<u32> for AlarmLevel {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::No,
            1 => Self::Warning,
            2 => Self::Error,
            3 => Self::Critical,
            _ => Self::Fatal,
        }
    }
}

impl From<AlarmLevel> for u32 {
    fn from(level: AlarmLevel) -> Self {
        level as u32
    }
}

/// 告警码
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum AlarmCode {
    No = 0,
    CannotRead = 1,
    InvalidDataType = 2,
    TriggerBufferFull = 3,
    PulseBufferFull = 4,
    LowFrameRate = 6,
    HighFrameRate = 7,
    SlowNetwork = 8,
    LowFrameIntegrity = 9,
    PointDataDrop = 10,
    FrameDataDrop = 11,
    ReadTimeout = 12,
    DropData1 = 13,
    DropData2 = 14,
    DropData3 = 15,
    DropData4 = 16,
    SensorError = 17,
    BadConfigYaml = 18,
    NoPointMemory = 19,
    FrameCallTooLong = 20,
    TempTooLow = 21,
    TempTooHigh = 22,
    LibVersionMismatch = 23,
    ClockDrift = 24,
    CorruptData = 25,
    OutOfMemory = 26,
    DropDataFilter = 27,
    FilterTooLong = 28,
    #[num_enum(catch_all)]
    Unknown(u32),
}

/// 告警消息
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlarmMessage {
    pub level: AlarmLevel,
    pub code: AlarmCode,
    pub message: String,
    pub source_id: u32,
}

impl AlarmMessage {
    pub fn new(level: AlarmLevel, code: AlarmCode, message: impl Into<String>) -> Self {
        Self {
            level,
            code,
            message: message.into(),
            source_id: 0,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(bytes, ALARM_MESSAGE_SIZE)?;
        let mut buf = &bytes[..ALARM_MESSAGE_SIZE];
        let level = AlarmLevel::from(buf.get_u32_le());
        let code = AlarmCode::from(buf.get_u32_le());
        let message = c_string(&buf[..ALARM_TEXT_LEN]);
        buf.advance(ALARM_TEXT_LEN);
        let source_id = buf.get_u32_le();
        Ok(Self {
            level,
            code,
            message,
            source_id,
        })
    }

    /// 序列化，消息超过 255 字节时截断（保留结尾 0）
    pub fn encode(&self) -> [u8; ALARM_MESSAGE_SIZE] {
        let mut out = [0u8; ALARM_MESSAGE_SIZE];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.level.into());
        buf.put_u32_le(self.code.into());
        put_c_string(&mut buf, &self.message, ALARM_TEXT_LEN);
        buf.put_u32_le(self.source_id);
        out
    }
}

// ============================================================================
// 包围盒
// ============================================================================

/// 以 0 结尾的定长字符串，超长时截断
fn put_c_string(buf: &mut impl BufMut, text: &str, len: usize) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(len - 1);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, len - n);
}

/// 包围盒（感知结果）
///
/// 保留字段不单独保存，编码时写 0。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundingBox {
    /// 中心（米）
    pub center: [f32; 3],
    /// 宽、高、深（米）
    pub size: [f32; 3],
    /// 姿态四元数 w, x, y, z
    pub pose: [f32; 4],
    pub speed_xyz: [f32; 3],
    pub label: i32,
    pub value: i32,
    pub box_type: i32,
    pub id: u32,
    pub confidence: i16,
    pub priority: i16,
    /// cm/s
    pub speed: u16,
    /// 0.01 度
    pub speed_heading: u16,
    /// 厘米
    pub radius: u16,
    pub radius_heading: u16,
    pub region_idx: i16,
    pub pc_count: u16,
    pub cluster_id: u16,
    pub alpha: f32,
    /// rgb，0 表示由显示端分配
    pub color: u32,
    pub style: u32,
    pub ts_100us: u32,
    pub longitude: i32,
    pub latitude: i32,
    /// 厘米
    pub elevation: i16,
    pub region: i16,
    pub source_id: u32,
    /// 上一帧合并进本包围盒的 id
    pub merged_ids: [u32; 3],
    pub text_position: [f32; 3],
    pub text_alpha: f32,
    pub text_color: u32,
    pub text_style: u32,
    pub text: String,
}

impl BoundingBox {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(bytes, BOUNDING_BOX_SIZE)?;
        let mut buf = &bytes[..BOUNDING_BOX_SIZE];
        let center = [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()];
        let size = [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()];
        let pose = [
            buf.get_f32_le(),
            buf.get_f32_le(),
            buf.get_f32_le(),
            buf.get_f32_le(),
        ];
        let speed_xyz = [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()];
        let label = buf.get_i32_le();
        let value = buf.get_i32_le();
        let box_type = buf.get_i32_le();
        let id = buf.get_u32_le();
        let confidence = buf.get_i16_le();
        let priority = buf.get_i16_le();
        let speed = buf.get_u16_le();
        let speed_heading = buf.get_u16_le();
        let radius = buf.get_u16_le();
        let radius_heading = buf.get_u16_le();
        let region_idx = buf.get_i16_le();
        let pc_count = buf.get_u16_le();
        let cluster_id = buf.get_u16_le();
        // reserved[1]
        buf.advance(2);
        let alpha = buf.get_f32_le();
        let color = buf.get_u32_le();
        let style = buf.get_u32_le();
        let ts_100us = buf.get_u32_le();
        let longitude = buf.get_i32_le();
        let latitude = buf.get_i32_le();
        let elevation = buf.get_i16_le();
        let region = buf.get_i16_le();
        let source_id = buf.get_u32_le();
        let merged_ids = [buf.get_u32_le(), buf.get_u32_le(), buf.get_u32_le()];
        // reserved2[4]
        buf.advance(BBOX_RESERVED2_LEN);
        let text_position = [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()];
        let text_alpha = buf.get_f32_le();
        let text_color = buf.get_u32_le();
        let text_style = buf.get_u32_le();
        let text = c_string(&buf[..TEXT_LEN]);

        Ok(Self {
            center,
            size,
            pose,
            speed_xyz,
            label,
            value,
            box_type,
            id,
            confidence,
            priority,
            speed,
            speed_heading,
            radius,
            radius_heading,
            region_idx,
            pc_count,
            cluster_id,
            alpha,
            color,
            style,
            ts_100us,
            longitude,
            latitude,
            elevation,
            region,
            source_id,
            merged_ids,
            text_position,
            text_alpha,
            text_color,
            text_style,
            text,
        })
    }

    /// 序列化，文本超过 63 字节时截断
    pub fn encode(&self) -> [u8; BOUNDING_BOX_SIZE] {
        let mut out = [0u8; BOUNDING_BOX_SIZE];
        let mut buf = &mut out[..];
        for v in self
            .center
            .iter()
            .chain(&self.size)
            .chain(&self.pose)
            .chain(&self.speed_xyz)
        {
            buf.put_f32_le(*v);
        }
        buf.put_i32_le(self.label);
        buf.put_i32_le(self.value);
        buf.put_i32_le(self.box_type);
        buf.put_u32_le(self.id);
        buf.put_i16_le(self.confidence);
        buf.put_i16_le(self.priority);
        buf.put_u16_le(self.speed);
        buf.put_u16_le(self.speed_heading);
        buf.put_u16_le(self.radius);
        buf.put_u16_le(self.radius_heading);
        buf.put_i16_le(self.region_idx);
        buf.put_u16_le(self.pc_count);
        buf.put_u16_le(self.cluster_id);
        buf.put_bytes(0, 2);
        buf.put_f32_le(self.alpha);
        buf.put_u32_le(self.color);
        buf.put_u32_le(self.style);
        buf.put_u32_le(self.ts_100us);
        buf.put_i32_le(self.longitude);
        buf.put_i32_le(self.latitude);
        buf.put_i16_le(self.elevation);
        buf.put_i16_le(self.region);
        buf.put_u32_le(self.source_id);
        self.merged_ids.iter().for_each(|id| buf.put_u32_le(*id));
        buf.put_bytes(0, BBOX_RESERVED2_LEN);
        self.text_position.iter().for_each(|v| buf.put_f32_le(*v));
        buf.put_f32_le(self.text_alpha);
        buf.put_u32_le(self.text_color);
        buf.put_u32_le(self.text_style);
        put_c_string(&mut buf, &self.text, TEXT_LEN);
        out
    }
}

// ============================================================================
// 文本
// ============================================================================

/// 文本条目
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextItem {
    pub position: [f32; 3],
    pub alpha: f32,
    pub label: i32,
    pub value: i32,
    pub text_type: i32,
    pub id: u32,
    pub confidence: i32,
    pub color: u32,
    pub style: u32,
    pub text: String,
    pub ts_100us: u32,
    pub source_id: u32,
}

impl TextItem {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(bytes, TEXT_ITEM_SIZE)?;
        let mut buf = &bytes[..TEXT_ITEM_SIZE];
        let position = [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()];
        let alpha = buf.get_f32_le();
        let label = buf.get_i32_le();
        let value = buf.get_i32_le();
        let text_type = buf.get_i32_le();
        let id = buf.get_u32_le();
        let confidence = buf.get_i32_le();
        buf.advance(TEXT_RESERVED_LEN);
        let color = buf.get_u32_le();
        let style = buf.get_u32_le();
        let text = c_string(&buf[..TEXT_LEN]);
        buf.advance(TEXT_LEN);
        let ts_100us = buf.get_u32_le();
        let source_id = buf.get_u32_le();

        Ok(Self {
            position,
            alpha,
            label,
            value,
            text_type,
            id,
            confidence,
            color,
            style,
            text,
            ts_100us,
            source_id,
        })
    }

    /// 序列化，文本超过 63 字节时截断
    pub fn encode(&self) -> [u8; TEXT_ITEM_SIZE] {
        let mut out = [0u8; TEXT_ITEM_SIZE];
        let mut buf = &mut out[..];
        self.position.iter().for_each(|v| buf.put_f32_le(*v));
        buf.put_f32_le(self.alpha);
        buf.put_i32_le(self.label);
        buf.put_i32_le(self.value);
        buf.put_i32_le(self.text_type);
        buf.put_u32_le(self.id);
        buf.put_i32_le(self.confidence);
        buf.put_bytes(0, TEXT_RESERVED_LEN);
        buf.put_u32_le(self.color);
        buf.put_u32_le(self.style);
        put_c_string(&mut buf, &self.text, TEXT_LEN);
        buf.put_u32_le(self.ts_100us);
        buf.put_u32_le(self.source_id);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_message_encoding() {
        let alarm = AlarmMessage {
            level: AlarmLevel::Critical,
            code: AlarmCode::SensorError,
            message: "laser over temperature".to_string(),
            source_id: 3,
        };
        let bytes = alarm.encode();
        assert_eq!(u32::from_le_bytes(bytes[0..4].try_into().unwrap()), 3);
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 17);
        assert_eq!(&bytes[8..30], b"laser over temperature");
        assert_eq!(u32::from_le_bytes(bytes[264..268].try_into().unwrap()), 3);
        assert_eq!(AlarmMessage::decode(&bytes).unwrap(), alarm);
    }

    #[test]
    fn test_alarm_message_truncates_long_text() {
        let alarm = AlarmMessage::new(AlarmLevel::Warning, AlarmCode::SlowNetwork, "x".repeat(400));
        let decoded = AlarmMessage::decode(&alarm.encode()).unwrap();
        assert_eq!(decoded.message.len(), 255);
    }

    #[test]
    fn test_alarm_level_order() {
        assert!(AlarmLevel::Fatal > AlarmLevel::Critical);
        assert!(AlarmLevel::Critical > AlarmLevel::Error);
        assert_eq!(AlarmLevel::from(9u32), AlarmLevel::Fatal);
        assert_eq!(AlarmLevel::from(0u32), AlarmLevel::No);
        assert_eq!(AlarmLevel::from(3u32), AlarmLevel::Critical);
        assert_eq!(AlarmLevel::from(256u32), AlarmLevel::Fatal);
        assert_eq!(AlarmLevel::from(u32::MAX), AlarmLevel::Fatal);
        assert_eq!(u32::from(AlarmLevel::Warning), 1);
        assert_eq!(u32::from(AlarmLevel::Fatal), 4);
    }

    #[test]
    fn test_alarm_code_unknown() {
        assert_eq!(AlarmCode::from(23u32), AlarmCode::LibVersionMismatch);
        assert_eq!(AlarmCode::from(5u32), AlarmCode::Unknown(5));
        assert_eq!(u32::from(AlarmCode::Unknown(77)), 77);
    }

    #[test]
    fn test_bounding_box_decode() {
        let mut bytes = [0u8; BOUNDING_BOX_SIZE];
        bytes[0..4].copy_from_slice(&1.5f32.to_le_bytes());
        // label @ 52
        bytes[52..56].copy_from_slice(&7i32.to_le_bytes());
        // id @ 64
        bytes[64..68].copy_from_slice(&42u32.to_le_bytes());
        // pc_count @ 82
        bytes[82..84].copy_from_slice(&300u16.to_le_bytes());
        // ts_100us @ 100
        bytes[100..104].copy_from_slice(&55u32.to_le_bytes());
        // source_id @ 116
        bytes[116..120].copy_from_slice(&9u32.to_le_bytes());
        // text @ 172
        bytes[172..175].copy_from_slice(b"car");

        let bbox = BoundingBox::decode(&bytes).unwrap();
        assert_eq!(bbox.center[0], 1.5);
        assert_eq!(bbox.label, 7);
        assert_eq!(bbox.id, 42);
        assert_eq!(bbox.pc_count, 300);
        assert_eq!(bbox.ts_100us, 55);
        assert_eq!(bbox.source_id, 9);
        assert_eq!(bbox.text, "car");
    }

    #[test]
    fn test_text_item_decode() {
        let mut bytes = [0u8; TEXT_ITEM_SIZE];
        bytes[12..16].copy_from_slice(&0.5f32.to_le_bytes());
        bytes[28..32].copy_from_slice(&11u32.to_le_bytes());
        // text @ 60
        bytes[60..65].copy_from_slice(b"hello");
        // ts_100us @ 124, source_id @ 128
        bytes[124..128].copy_from_slice(&8u32.to_le_bytes());
        bytes[128..132].copy_from_slice(&2u32.to_le_bytes());

        let text = TextItem::decode(&bytes).unwrap();
        assert_eq!(text.alpha, 0.5);
        assert_eq!(text.id, 11);
        assert_eq!(text.text, "hello");
        assert_eq!(text.ts_100us, 8);
        assert_eq!(text.source_id, 2);
    }

    #[test]
    fn test_short_buffers_rejected() {
        assert!(BoundingBox::decode(&[0u8; 100]).is_err());
        assert!(TextItem::decode(&[0u8; 159]).is_err());
        assert!(AlarmMessage::decode(&[0u8; 8]).is_err());
    }
}
