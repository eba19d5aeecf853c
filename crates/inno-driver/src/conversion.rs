//! 坐标转换
//!
//! 把紧凑点的极坐标（半径厘米 + 两个 π/8192 单位的有符号角度）转换为米制笛卡尔坐标：
//!
//! ```text
//! radius_m = radius / 100
//! x = radius_m * sin(v)
//! t = radius_m * cos(v)
//! y = t * sin(h)
//! z = t * cos(h)
//! ```
//!
//! `TrigMode::Fast` 用多项式近似代替 `sin`/`cos`，满量程最大误差约 0.002%
//! （单位半径下绝对误差 < 2.4e-5）。

use crate::error::DriverError;
use inno_protocol::ANGLE_UNIT_RAD;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// 三角函数计算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TrigMode {
    /// 标准库 `sin`/`cos`
    #[default]
    Exact = 0,
    /// 多项式近似
    Fast = 1,
}

impl TrigMode {
    /// 从整数开关构造（0 = 精确，1 = 近似）
    pub fn from_i32(value: i32) -> Result<Self, DriverError> {
        match value {
            0 => Ok(Self::Exact),
            1 => Ok(Self::Fast),
            other => Err(DriverError::Configuration(format!(
                "enable_fast_sin_cos must be 0 or 1, got {}",
                other
            ))),
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// 快速正弦，输入范围 [-π, π]
#[inline]
pub fn fast_sine(x: f64) -> f64 {
    let y = x * (1.273_239_545 + -0.405_284_735 * x.abs());
    y * (y.abs() * (0.0192 * y.abs() + 0.1951) + 0.7857)
}

/// 快速余弦，输入范围 [-3π/2, π/2]
#[inline]
pub fn fast_cosine(x: f64) -> f64 {
    fast_sine(x + FRAC_PI_2)
}

/// 笛卡尔坐标（米）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Cartesian {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// 极坐标到笛卡尔坐标的转换器
///
/// 计算方式在构造时确定，运行期间不可变。
#[derive(Debug, Clone, Copy, Default)]
pub struct PointConverter {
    mode: TrigMode,
}

impl PointConverter {
    pub fn new(mode: TrigMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> TrigMode {
        self.mode
    }

    /// 转换单个点
    ///
    /// # 参数
    ///
    /// - `radius_cm`: 半径（厘米）
    /// - `h_angle` / `v_angle`: 角度（π/8192 rad 单位）
    ///
    /// 紧凑点的角度位宽保证 |角度| < π/2，始终处于近似算法的有效区间内。
    #[inline]
    pub fn convert(&self, radius_cm: f64, h_angle: f64, v_angle: f64) -> Cartesian {
        let radius = radius_cm / 100.0;
        let h = h_angle * ANGLE_UNIT_RAD;
        let v = v_angle * ANGLE_UNIT_RAD;
        let (sin_v, cos_v, sin_h, cos_h) = match self.mode {
            TrigMode::Exact => (v.sin(), v.cos(), h.sin(), h.cos()),
            TrigMode::Fast => (fast_sine(v), fast_cosine(v), fast_sine(h), fast_cosine(h)),
        };
        let t = radius * cos_v;
        Cartesian {
            x: radius * sin_v,
            y: t * sin_h,
            z: t * cos_h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    /// 满量程误差上限（单位半径）
    const FAST_TOLERANCE: f64 = 2.34e-5;

    #[test]
    fn test_trig_mode_from_i32() {
        assert_eq!(TrigMode::from_i32(0).unwrap(), TrigMode::Exact);
        assert_eq!(TrigMode::from_i32(1).unwrap(), TrigMode::Fast);
        assert!(matches!(
            TrigMode::from_i32(2),
            Err(DriverError::Configuration(_))
        ));
        assert_eq!(TrigMode::Fast.as_i32(), 1);
    }

    #[test]
    fn test_fast_sine_sweep() {
        let steps = 100_000;
        let mut max_err: f64 = 0.0;
        for i in 0..=steps {
            let x = -PI + 2.0 * PI * i as f64 / steps as f64;
            max_err = max_err.max((fast_sine(x) - x.sin()).abs());
        }
        assert!(max_err < FAST_TOLERANCE, "max error {}", max_err);
        assert_eq!(fast_sine(0.0), 0.0);
    }

    #[test]
    fn test_fast_cosine_matches_shifted_sine() {
        for i in -100..=100 {
            let x = i as f64 * 0.01;
            assert_eq!(fast_cosine(x), fast_sine(x + FRAC_PI_2));
            assert!((fast_cosine(x) - x.cos()).abs() < FAST_TOLERANCE);
        }
    }

    #[test]
    fn test_exact_axes() {
        let conv = PointConverter::new(TrigMode::Exact);

        // 正前方：全部落在 z 轴
        let p = conv.convert(1000.0, 0.0, 0.0);
        assert_eq!(p, Cartesian { x: 0.0, y: 0.0, z: 10.0 });

        // 水平角 π/4
        let p = conv.convert(200.0, 2048.0, 0.0);
        let expected = 2.0 * (PI / 4.0).sin();
        assert!((p.y - expected).abs() < 1e-12);
        assert!((p.z - expected).abs() < 1e-12);
        assert_eq!(p.x, 0.0);

        // 垂直角 -π/4
        let p = conv.convert(100.0, 0.0, -2048.0);
        assert!((p.x + (PI / 4.0).sin()).abs() < 1e-12);
        assert!((p.z - (PI / 4.0).cos()).abs() < 1e-12);
    }

    #[test]
    fn test_radius_preserved() {
        let conv = PointConverter::new(TrigMode::Exact);
        let p = conv.convert(12_345.0, -1500.0, 700.0);
        let r = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
        assert!((r - 123.45).abs() < 1e-9);
    }

    proptest! {
        /// 近似模式在协议合法范围内与精确模式的差值不超过满量程的 0.00234%（约 0.002%）
        #[test]
        fn prop_fast_matches_exact(
            radius in 0u16..=u16::MAX,
            h in -4096i16..=4095,
            v in -2048i16..=2047,
        ) {
            let exact = PointConverter::new(TrigMode::Exact);
            let fast = PointConverter::new(TrigMode::Fast);
            let a = exact.convert(f64::from(radius), f64::from(h), f64::from(v));
            let b = fast.convert(f64::from(radius), f64::from(h), f64::from(v));
            let bound = FAST_TOLERANCE * f64::from(radius) / 100.0 + 1e-12;
            prop_assert!((a.x - b.x).abs() <= bound, "x {} vs {}", a.x, b.x);
            prop_assert!((a.y - b.y).abs() <= bound, "y {} vs {}", a.y, b.y);
            prop_assert!((a.z - b.z).abs() <= bound, "z {} vs {}", a.z, b.z);
        }
    }
}
