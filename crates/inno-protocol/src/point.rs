//! 点类型定义
//!
//! 位域按 LSB first 排列（GCC packed 位域在小端机器上的布局），
//! bilge 默认位序与之一致。

use crate::{ANGLE_UNIT_RAD, ProtocolError, ensure_len};
use bilge::prelude::*;
use bytes::{Buf, BufMut};

/// 原始点大小（字节）
pub const RAW_POINT_SIZE: usize = 24;
/// 紧凑点大小（字节）
pub const COMPACT_POINT_SIZE: usize = 12;
/// 扩展紧凑点大小（字节）
pub const COMPACT_POINT_EXT_SIZE: usize = COMPACT_POINT_SIZE + 12;

/// 水平角位宽
const H_ANGLE_BITS: u32 = 13;
/// 垂直角位宽
const V_ANGLE_BITS: u32 = 12;

/// 将 `bits` 位的补码扩展为 i16
fn sign_extend(raw: u16, bits: u32) -> i16 {
    let shift = 16 - bits;
    ((raw << shift) as i16) >> shift
}

// ============================================================================
// 紧凑点
// ============================================================================

/// 紧凑点（96 位）
///
/// | 位 | 字段 |
/// |---|---|
/// | 0-15 | radius（厘米） |
/// | 16-28 | h_angle（有符号，π/8192 rad） |
/// | 29-40 | v_angle（有符号，π/8192 rad） |
/// | 41-54 | ts_100us（相对帧起始） |
/// | 55-64 | scan_id |
/// | 65-68 | flags（通道） |
/// | 69-78 | scan_idx |
/// | 79 | 保留 |
/// | 80-95 | reflectance |
#[bitsize(96)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq, Eq)]
pub struct CompactPoint {
    pub radius: u16,
    pub h_angle_raw: u13,
    pub v_angle_raw: u12,
    pub ts_100us: u14,
    pub scan_id: u10,
    pub flags: u4,
    pub scan_idx: u10,
    pub reserved: u1,
    pub reflectance: u16,
}

/// 构造紧凑点所需的字段（角度为有符号值）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactPointFields {
    pub radius: u16,
    pub h_angle: i16,
    pub v_angle: i16,
    pub ts_100us: u16,
    pub scan_id: u16,
    pub flags: u8,
    pub scan_idx: u16,
    pub reflectance: u16,
}

impl CompactPoint {
    /// 从字段构造，超出位宽的高位被截掉
    pub fn from_fields(fields: CompactPointFields) -> Self {
        let mut p = CompactPoint::from(u96::new(0));
        p.set_radius(fields.radius);
        p.set_h_angle_raw(u13::new((fields.h_angle as u16) & 0x1FFF));
        p.set_v_angle_raw(u12::new((fields.v_angle as u16) & 0x0FFF));
        p.set_ts_100us(u14::new(fields.ts_100us & 0x3FFF));
        p.set_scan_id(u10::new(fields.scan_id & 0x03FF));
        p.set_flags(u4::new(fields.flags & 0x0F));
        p.set_scan_idx(u10::new(fields.scan_idx & 0x03FF));
        p.set_reflectance(fields.reflectance);
        p
    }

    /// 从 12 字节解析
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(bytes, COMPACT_POINT_SIZE)?;
        let mut word = [0u8; 16];
        word[..COMPACT_POINT_SIZE].copy_from_slice(&bytes[..COMPACT_POINT_SIZE]);
        Ok(CompactPoint::from(u96::new(u128::from_le_bytes(word))))
    }

    /// 序列化为 12 字节
    pub fn encode(&self) -> [u8; COMPACT_POINT_SIZE] {
        let word = u96::from(*self).value().to_le_bytes();
        let mut out = [0u8; COMPACT_POINT_SIZE];
        out.copy_from_slice(&word[..COMPACT_POINT_SIZE]);
        out
    }

    /// 水平角（有符号原始单位）
    pub fn h_angle(&self) -> i16 {
        sign_extend(self.h_angle_raw().value(), H_ANGLE_BITS)
    }

    /// 垂直角（有符号原始单位）
    pub fn v_angle(&self) -> i16 {
        sign_extend(self.v_angle_raw().value(), V_ANGLE_BITS)
    }

    /// 水平角（弧度）
    pub fn h_angle_rad(&self) -> f64 {
        f64::from(self.h_angle()) * ANGLE_UNIT_RAD
    }

    /// 垂直角（弧度）
    pub fn v_angle_rad(&self) -> f64 {
        f64::from(self.v_angle()) * ANGLE_UNIT_RAD
    }

    /// 展开为普通字段
    pub fn fields(&self) -> CompactPointFields {
        CompactPointFields {
            radius: self.radius(),
            h_angle: self.h_angle(),
            v_angle: self.v_angle(),
            ts_100us: self.ts_100us().value(),
            scan_id: self.scan_id().value(),
            flags: self.flags().value(),
            scan_idx: self.scan_idx().value(),
            reflectance: self.reflectance(),
        }
    }
}

/// 扩展紧凑点：紧凑点 + 传感器计算的 xyz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactPointExt {
    pub point: CompactPoint,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl CompactPointExt {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(bytes, COMPACT_POINT_EXT_SIZE)?;
        let point = CompactPoint::decode(&bytes[..COMPACT_POINT_SIZE])?;
        let mut buf = &bytes[COMPACT_POINT_SIZE..COMPACT_POINT_EXT_SIZE];
        Ok(Self {
            point,
            x: buf.get_f32_le(),
            y: buf.get_f32_le(),
            z: buf.get_f32_le(),
        })
    }

    pub fn encode(&self) -> [u8; COMPACT_POINT_EXT_SIZE] {
        let mut out = [0u8; COMPACT_POINT_EXT_SIZE];
        out[..COMPACT_POINT_SIZE].copy_from_slice(&self.point.encode());
        let mut buf = &mut out[COMPACT_POINT_SIZE..];
        buf.put_f32_le(self.x);
        buf.put_f32_le(self.y);
        buf.put_f32_le(self.z);
        out
    }
}

// ============================================================================
// 原始点
// ============================================================================

/// 原始点尾部 3 字节位域
#[bitsize(24)]
#[derive(FromBits, DebugBits, Clone, Copy, PartialEq, Eq)]
pub struct RawPointTail {
    pub scan_id: u10,
    pub scan_idx: u10,
    pub reserved: u4,
}

/// 原始点（传感器已计算好的笛卡尔坐标，单位米）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    /// 向上
    pub x: f32,
    /// 向右
    pub y: f32,
    /// 向前
    pub z: f32,
    pub radius: f32,
    pub ts_100us: u16,
    pub reflectance: u16,
    pub flags: u8,
    pub scan_id: u16,
    pub scan_idx: u16,
}

impl RawPoint {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(bytes, RAW_POINT_SIZE)?;
        let mut buf = &bytes[..RAW_POINT_SIZE];
        let x = buf.get_f32_le();
        let y = buf.get_f32_le();
        let z = buf.get_f32_le();
        let radius = buf.get_f32_le();
        let ts_100us = buf.get_u16_le();
        let reflectance = buf.get_u16_le();
        let flags = buf.get_u8();
        let tail = RawPointTail::from(u24::new(buf.get_uint_le(3) as u32));
        Ok(Self {
            x,
            y,
            z,
            radius,
            ts_100us,
            reflectance,
            flags,
            scan_id: tail.scan_id().value(),
            scan_idx: tail.scan_idx().value(),
        })
    }

    pub fn encode(&self) -> [u8; RAW_POINT_SIZE] {
        let mut tail = RawPointTail::from(u24::new(0));
        tail.set_scan_id(u10::new(self.scan_id & 0x03FF));
        tail.set_scan_idx(u10::new(self.scan_idx & 0x03FF));

        let mut out = [0u8; RAW_POINT_SIZE];
        let mut buf = &mut out[..];
        buf.put_f32_le(self.x);
        buf.put_f32_le(self.y);
        buf.put_f32_le(self.z);
        buf.put_f32_le(self.radius);
        buf.put_u16_le(self.ts_100us);
        buf.put_u16_le(self.reflectance);
        buf.put_u8(self.flags);
        buf.put_uint_le(u64::from(u24::from(tail).value()), 3);
        out
    }
}
