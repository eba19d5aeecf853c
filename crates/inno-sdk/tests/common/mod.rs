//! 集成测试公共工具：合成帧与期望值计算

#![allow(dead_code)]

use inno_sdk::protocol::{ANGLE_UNIT_RAD, CompactPoint, CompactPointFields, Frame, FrameHeader};
use rand::Rng;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

/// 帧起始时间（微秒）
pub const TS_US_START: f64 = 1_600_000_000_000_000.0;

/// 帧起始时间（纳秒）
pub const T0_NS: u64 = 1_600_000_000_000_000_000;

/// 随机点，前三个点的相对时间戳固定为 0、1、16383
pub fn random_points(n: usize) -> Vec<CompactPointFields> {
    let mut rng = rand::thread_rng();
    (0..n)
        .map(|i| CompactPointFields {
            radius: rng.gen_range(1..u16::MAX),
            h_angle: rng.gen_range(-4095..4096),
            v_angle: rng.gen_range(-2047..2048),
            ts_100us: match i {
                0 => 0,
                1 => 1,
                2 => 16383,
                _ => rng.gen_range(0..16384),
            },
            scan_id: rng.gen_range(0..1024),
            flags: rng.gen_range(0..16),
            scan_idx: rng.gen_range(0..1024),
            reflectance: rng.r#gen(),
        })
        .collect()
}

pub fn compact_frame(idx: u64, points: &[CompactPointFields]) -> Frame {
    Frame::from_compact_points(
        1,
        FrameHeader {
            idx,
            ts_us_start: TS_US_START,
            ts_us_end: TS_US_START + 100_000.0,
            ..FrameHeader::default()
        },
        points.iter().copied().map(CompactPoint::from_fields).collect(),
    )
}

/// 声明的条目数比实际多一个
pub fn mismatched_frame(idx: u64, points: &[CompactPointFields]) -> Frame {
    let mut frame = compact_frame(idx, points);
    frame.header.item_number += 1;
    frame
}

/// 精确三角函数下的期望坐标（米）
pub fn expected_xyz(p: &CompactPointFields) -> (f64, f64, f64) {
    let r = f64::from(p.radius) / 100.0;
    let h = f64::from(p.h_angle) * ANGLE_UNIT_RAD;
    let v = f64::from(p.v_angle) * ANGLE_UNIT_RAD;
    (r * v.sin(), r * v.cos() * h.sin(), r * v.cos() * h.cos())
}

pub fn expected_timestamp_ns(p: &CompactPointFields) -> u64 {
    T0_NS + u64::from(p.ts_100us) * 100_000
}
