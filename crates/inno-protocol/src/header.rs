//! cframe 头部定义
//!
//! 头部为 76 字节 packed 小端结构，紧随其后是按 `type` 标签解释的条目数组。

use crate::{CFRAME_VERSION, ProtocolError, ensure_len, point, items};
use bilge::prelude::*;
use bytes::{Buf, BufMut};

/// 头部固定大小（字节）
pub const HEADER_SIZE: usize = 76;

// ============================================================================
// 帧类型
// ============================================================================

/// cframe 载荷类型
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    num_enum::TryFromPrimitive,
    num_enum::IntoPrimitive,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum FrameType {
    None = 0,
    /// 原始点（已含 xyz）
    Point = 1,
    /// 紧凑点（极坐标）
    CompactPoint = 2,
    BoundingBox = 3,
    Text = 4,
    Alarm = 5,
    /// 紧凑点 + xyz
    CompactPointExt = 6,
}

impl FrameType {
    /// 按类型查询单个条目的字节数
    ///
    /// `None` 类型没有条目，返回 `None`。
    pub fn item_size(self) -> Option<usize> {
        match self {
            FrameType::None => None,
            FrameType::Point => Some(point::RAW_POINT_SIZE),
            FrameType::CompactPoint => Some(point::COMPACT_POINT_SIZE),
            FrameType::CompactPointExt => Some(point::COMPACT_POINT_EXT_SIZE),
            FrameType::BoundingBox => Some(items::BOUNDING_BOX_SIZE),
            FrameType::Text => Some(items::TEXT_ITEM_SIZE),
            FrameType::Alarm => Some(items::ALARM_MESSAGE_SIZE),
        }
    }
}

/// 时间同步来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u32)]
pub enum TimestampSync {
    None = 0,
    Recorded = 1,
    Host = 2,
    GpsInit = 3,
    GpsLocked = 4,
    GpsUnlocked = 5,
    PtpInit = 6,
    PtpLocked = 7,
    PtpUnlocked = 8,
    FileInit = 9,
    #[num_enum(catch_all)]
    Unknown(u32),
}

// ============================================================================
// 标志位
// ============================================================================

/// 头部标志位（Byte 1）
///
/// - Bit 0: 置位表示**不是**子帧的最后一个序列
/// - Bit 1: 置位表示**不是**帧的最后一个子帧
/// - Bit 2-7: 保留
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    pub not_last_sequence: bool,
    pub not_last_subframe: bool,
    pub reserved: u6,
}

impl FrameFlags {
    pub fn from_byte(byte: u8) -> Self {
        FrameFlags::from(u8::new(byte))
    }

    pub fn to_byte(self) -> u8 {
        u8::from(self).value()
    }

    /// 是否为子帧中的最后一个序列
    pub fn is_last_sequence(self) -> bool {
        !self.not_last_sequence()
    }

    /// 是否为帧中的最后一个子帧
    pub fn is_last_subframe(self) -> bool {
        !self.not_last_subframe()
    }
}

// ============================================================================
// 头部
// ============================================================================

/// cframe 头部
///
/// 字段顺序与线上布局一致，`type_tag` 保留原始值，
/// 通过 [`FrameHeader::frame_type`] 得到强类型。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameHeader {
    pub version: u8,
    pub flags: u8,
    pub header_size: u16,
    pub checksum: u32,
    /// 1/10000000 度
    pub longitude: i32,
    pub latitude: i32,
    /// 厘米
    pub elevation: i16,
    pub pose_yaw: i16,
    pub pose_pitch: i16,
    pub pose_roll: i16,
    /// 帧序号（从 0 开始）
    pub idx: u64,
    pub sub_idx: u16,
    pub sub_seq: u16,
    /// 帧起始时间（UNIX 纪元，微秒）
    pub ts_us_start: f64,
    pub ts_us_end: f64,
    pub type_tag: u32,
    pub topic: u32,
    pub item_number: u32,
    pub conf_level: u8,
    pub source_id: u32,
    pub item_size: u16,
    pub timestamp_sync: u32,
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self {
            version: CFRAME_VERSION,
            flags: 0,
            header_size: HEADER_SIZE as u16,
            checksum: 0,
            longitude: 0,
            latitude: 0,
            elevation: 0,
            pose_yaw: 0,
            pose_pitch: 0,
            pose_roll: 0,
            idx: 0,
            sub_idx: 0,
            sub_seq: 0,
            ts_us_start: 0.0,
            ts_us_end: 0.0,
            type_tag: FrameType::None.into(),
            topic: 0,
            item_number: 0,
            conf_level: 255,
            source_id: 0,
            item_size: 0,
            timestamp_sync: 0,
        }
    }
}

impl FrameHeader {
    /// 构造指定类型的头部，`item_size` 自动填充
    pub fn new(frame_type: FrameType, item_number: u32) -> Self {
        Self {
            type_tag: frame_type.into(),
            item_number,
            item_size: frame_type.item_size().unwrap_or(0) as u16,
            ..Self::default()
        }
    }

    /// 从字节解析头部（仅检查缓冲区长度，结构校验见 `frame::decode_frame`）
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(bytes, HEADER_SIZE)?;
        let mut buf = &bytes[..HEADER_SIZE];
        let version = buf.get_u8();
        let flags = buf.get_u8();
        let header_size = buf.get_u16_le();
        let checksum = buf.get_u32_le();
        let longitude = buf.get_i32_le();
        let latitude = buf.get_i32_le();
        let elevation = buf.get_i16_le();
        let pose_yaw = buf.get_i16_le();
        let pose_pitch = buf.get_i16_le();
        let pose_roll = buf.get_i16_le();
        let idx = buf.get_u64_le();
        let sub_idx = buf.get_u16_le();
        let sub_seq = buf.get_u16_le();
        let ts_us_start = buf.get_f64_le();
        let ts_us_end = buf.get_f64_le();
        let type_tag = buf.get_u32_le();
        let topic = buf.get_u32_le();
        let item_number = buf.get_u32_le();
        let conf_level = buf.get_u8();
        let source_id = buf.get_u32_le();
        let _reserved = buf.get_u8();
        let item_size = buf.get_u16_le();
        let timestamp_sync = buf.get_u32_le();

        Ok(Self {
            version,
            flags,
            header_size,
            checksum,
            longitude,
            latitude,
            elevation,
            pose_yaw,
            pose_pitch,
            pose_roll,
            idx,
            sub_idx,
            sub_seq,
            ts_us_start,
            ts_us_end,
            type_tag,
            topic,
            item_number,
            conf_level,
            source_id,
            item_size,
            timestamp_sync,
        })
    }

    /// 序列化为 76 字节
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut buf = &mut out[..];
        buf.put_u8(self.version);
        buf.put_u8(self.flags);
        buf.put_u16_le(self.header_size);
        buf.put_u32_le(self.checksum);
        buf.put_i32_le(self.longitude);
        buf.put_i32_le(self.latitude);
        buf.put_i16_le(self.elevation);
        buf.put_i16_le(self.pose_yaw);
        buf.put_i16_le(self.pose_pitch);
        buf.put_i16_le(self.pose_roll);
        buf.put_u64_le(self.idx);
        buf.put_u16_le(self.sub_idx);
        buf.put_u16_le(self.sub_seq);
        buf.put_f64_le(self.ts_us_start);
        buf.put_f64_le(self.ts_us_end);
        buf.put_u32_le(self.type_tag);
        buf.put_u32_le(self.topic);
        buf.put_u32_le(self.item_number);
        buf.put_u8(self.conf_level);
        buf.put_u32_le(self.source_id);
        buf.put_u8(0);
        buf.put_u16_le(self.item_size);
        buf.put_u32_le(self.timestamp_sync);
        out
    }

    /// 强类型帧类型，未知标签返回 `None`
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::try_from(self.type_tag).ok()
    }

    pub fn frame_flags(&self) -> FrameFlags {
        FrameFlags::from_byte(self.flags)
    }

    pub fn timestamp_sync(&self) -> TimestampSync {
        TimestampSync::from(self.timestamp_sync)
    }

    /// 帧起始时间（纳秒），微秒部分先截断为整数
    pub fn frame_start_ns(&self) -> u64 {
        (self.ts_us_start as u64).wrapping_mul(1000)
    }

    /// 帧结束时间（纳秒），微秒部分先截断为整数
    pub fn frame_end_ns(&self) -> u64 {
        (self.ts_us_end as u64).wrapping_mul(1000)
    }

    /// 对外发布的 32 位序号
    pub fn sequence_num(&self) -> u32 {
        (self.idx % u64::from(u32::MAX)) as u32
    }
}
