//! 帧分发
//!
//! 每收到一帧：可选地修正帧起始时间，把紧凑点转换为扫描记录（极坐标）与点云记录（笛卡尔），
//! 写入已配置的输出通道。状态字符串中的 IMU 数据转换为 IMU 记录。
//!
//! # 线程模型
//!
//! 同一个帧源的回调在同一个投递线程上串行执行；不同帧源可以并发调用各自的分发器。
//! 每次回调都构造全新的记录（替换而非原地修改），热路径上没有锁。

use crate::config::DriverConfig;
use crate::conversion::PointConverter;
use crate::error::DriverError;
use crate::metrics::DriverMetrics;
use crate::records::{
    FrameInfo, ImuRecord, PointCloudRecord, PointXyzit, RecordHeader, ScanPoint, ScanRecord,
};
use crate::sink::RecordSink;
use crate::telemetry::parse_status_lossy;
use arc_swap::ArcSwapOption;
use inno_protocol::{CompactPoint, Frame, FrameHeader};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{trace, warn};

/// 相对时间戳单位（100 微秒）对应的纳秒数
pub const TS_100US_NS: u64 = 100_000;

// ============================================================================
// 时钟与时间戳修正
// ============================================================================

/// 本地时钟
pub trait Clock: Send + Sync {
    /// Unix 纪元以来的纳秒数
    fn now_ns(&self) -> u64;
}

/// 系统墙钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}

/// 帧起始时间修正策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampCorrection {
    /// 不修正
    Disabled,
    /// 总是用本地接收时间替换
    Always,
    /// 本地时间与帧时间相差超过阈值（纳秒）时替换
    Threshold(u64),
}

impl TimestampCorrection {
    /// 从毫秒配置构造：0 不修正，负数总是修正
    pub fn from_ms(ms: i64) -> Self {
        match ms {
            0 => Self::Disabled,
            ms if ms < 0 => Self::Always,
            ms => Self::Threshold((ms as u64).saturating_mul(1_000_000)),
        }
    }

    /// 计算修正后的帧起始时间（微秒）
    ///
    /// 不需要修正时返回 `None`。修正值为本地时间截断到整微秒。
    pub fn correct(&self, ts_us_start: f64, local_ns: u64) -> Option<f64> {
        let apply = match *self {
            Self::Disabled => false,
            Self::Always => true,
            Self::Threshold(threshold_ns) => {
                let frame_ns = (ts_us_start as u64).wrapping_mul(1000);
                local_ns.abs_diff(frame_ns) > threshold_ns
            },
        };
        apply.then(|| (local_ns / 1000) as f64)
    }
}

// ============================================================================
// 极坐标样本
// ============================================================================

/// 转换前的单点（浮点形式，便于在三角计算前做 NaN 过滤）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolarSample {
    /// 半径（厘米）
    pub radius: f64,
    /// 水平角（π/8192 rad）
    pub h_angle: f64,
    /// 垂直角（π/8192 rad）
    pub v_angle: f64,
    pub ts_100us: u16,
    pub reflectance: u16,
    pub flags: u8,
    pub scan_id: u16,
    pub scan_idx: u16,
}

impl PolarSample {
    /// 半径或任一角度为 NaN 的点不产生任何输出
    pub fn is_valid(&self) -> bool {
        !(self.radius.is_nan() || self.h_angle.is_nan() || self.v_angle.is_nan())
    }

    /// 绝对时间戳（纳秒）
    pub fn timestamp_ns(&self, frame_start_ns: u64) -> u64 {
        u64::from(self.ts_100us) * TS_100US_NS + frame_start_ns
    }
}

impl From<&CompactPoint> for PolarSample {
    fn from(p: &CompactPoint) -> Self {
        Self {
            radius: f64::from(p.radius()),
            h_angle: f64::from(p.h_angle()),
            v_angle: f64::from(p.v_angle()),
            ts_100us: p.ts_100us().value(),
            reflectance: p.reflectance(),
            flags: p.flags().value(),
            scan_id: p.scan_id().value(),
            scan_idx: p.scan_idx().value(),
        }
    }
}

/// 单帧产生的记录（尚未写入通道）
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameRecords {
    pub scan: Option<ScanRecord>,
    pub pointcloud: Option<PointCloudRecord>,
    /// 因 NaN 被过滤的点数
    pub nan_dropped: usize,
}

// ============================================================================
// 分发器
// ============================================================================

/// 帧分发器
pub struct FrameDispatcher {
    config: Arc<DriverConfig>,
    converter: PointConverter,
    correction: TimestampCorrection,
    clock: Arc<dyn Clock>,
    metrics: Arc<DriverMetrics>,
    scan_sink: Option<Arc<dyn RecordSink<ScanRecord>>>,
    pointcloud_sink: Option<Arc<dyn RecordSink<PointCloudRecord>>>,
    imu_sink: Option<Arc<dyn RecordSink<ImuRecord>>>,
    last_scan: ArcSwapOption<ScanRecord>,
    last_pointcloud: ArcSwapOption<PointCloudRecord>,
    last_imu: ArcSwapOption<ImuRecord>,
}

impl FrameDispatcher {
    /// 按配置构造（无输出通道，使用系统时钟）
    pub fn new(config: Arc<DriverConfig>) -> Result<Self, DriverError> {
        let converter = PointConverter::new(config.trig_mode()?);
        let correction = TimestampCorrection::from_ms(config.time_fix_err_ms);
        Ok(Self {
            config,
            converter,
            correction,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(DriverMetrics::default()),
            scan_sink: None,
            pointcloud_sink: None,
            imu_sink: None,
            last_scan: ArcSwapOption::empty(),
            last_pointcloud: ArcSwapOption::empty(),
            last_imu: ArcSwapOption::empty(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DriverMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_scan_sink(mut self, sink: Arc<dyn RecordSink<ScanRecord>>) -> Self {
        self.scan_sink = Some(sink);
        self
    }

    pub fn with_pointcloud_sink(mut self, sink: Arc<dyn RecordSink<PointCloudRecord>>) -> Self {
        self.pointcloud_sink = Some(sink);
        self
    }

    pub fn with_imu_sink(mut self, sink: Arc<dyn RecordSink<ImuRecord>>) -> Self {
        self.imu_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &Arc<DriverConfig> {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<DriverMetrics> {
        &self.metrics
    }

    /// 是否配置了任一点输出通道
    pub fn has_point_output(&self) -> bool {
        self.scan_sink.is_some() || self.pointcloud_sink.is_some()
    }

    /// 最近一次发布的扫描记录
    pub fn last_scan(&self) -> Option<Arc<ScanRecord>> {
        self.last_scan.load_full()
    }

    /// 最近一次发布的点云记录
    pub fn last_pointcloud(&self) -> Option<Arc<PointCloudRecord>> {
        self.last_pointcloud.load_full()
    }

    /// 最近一次发布的 IMU 记录
    pub fn last_imu(&self) -> Option<Arc<ImuRecord>> {
        self.last_imu.load_full()
    }

    fn now_sec(&self) -> f64 {
        self.clock.now_ns() as f64 / 1e9
    }

    /// 处理一帧
    ///
    /// 只有紧凑点帧产生输出，其他类型被忽略。
    /// 返回帧头声明的条目数，与实际接受的点数（NaN 过滤后）无关。
    pub fn on_frame(&self, frame: &Frame) -> u32 {
        self.metrics.frames_received.fetch_add(1, Ordering::Relaxed);
        let declared = frame.header.item_number;

        let Some(points) = frame.compact_points() else {
            self.metrics.frames_ignored.fetch_add(1, Ordering::Relaxed);
            trace!(
                "[FrameDispatcher] ignore frame idx={} type={}",
                frame.header.idx, frame.header.type_tag
            );
            return declared;
        };
        if !self.has_point_output() {
            return declared;
        }

        let header = self.corrected_header(&frame.header);
        self.publish(&header, points.iter().map(PolarSample::from));
        declared
    }

    /// 应用时间戳修正
    fn corrected_header(&self, header: &FrameHeader) -> FrameHeader {
        let mut header = *header;
        if self.correction == TimestampCorrection::Disabled {
            return header;
        }
        let local_ns = self.clock.now_ns();
        if let Some(ts_us) = self.correction.correct(header.ts_us_start, local_ns) {
            warn!(
                "[FrameDispatcher] frame[{}] shifting bigger than {}ms, move {} to {}",
                header.sequence_num(),
                self.config.time_fix_err_ms,
                header.frame_start_ns(),
                local_ns
            );
            header.ts_us_start = ts_us;
            self.metrics
                .timestamp_corrections
                .fetch_add(1, Ordering::Relaxed);
        }
        header
    }

    fn frame_info(&self, header: &FrameHeader) -> FrameInfo {
        FrameInfo {
            frame_id: self.config.frame_id.clone(),
            idx: header.idx,
            measurement_time: header.ts_us_start * 1e-6,
            frame_ns_start: header.frame_start_ns(),
            frame_ns_end: header.frame_end_ns(),
            model: self.config.lidar_model.clone(),
            source_id: self.config.lidar_id,
            height: 1,
            width: header.item_number,
            reflectance: self.config.reflectance,
        }
    }

    fn record_header(&self, header: &FrameHeader) -> RecordHeader {
        RecordHeader {
            frame_id: self.config.frame_id.clone(),
            sequence_num: header.sequence_num(),
            lidar_timestamp_ns: header.frame_start_ns(),
            timestamp_sec: 0.0,
        }
    }

    /// 由帧头与样本构造记录（纯函数，不写通道、不读时钟）
    ///
    /// 只为已配置的通道构造对应记录。
    pub fn build_records(
        &self,
        header: &FrameHeader,
        samples: impl IntoIterator<Item = PolarSample>,
    ) -> FrameRecords {
        let capacity = header.item_number as usize;
        let frame_start_ns = header.frame_start_ns();
        let mut scan_points = self.scan_sink.as_ref().map(|_| Vec::with_capacity(capacity));
        let mut cloud_points = self
            .pointcloud_sink
            .as_ref()
            .map(|_| Vec::with_capacity(capacity));
        let mut nan_dropped = 0;

        for s in samples {
            if !s.is_valid() {
                nan_dropped += 1;
                continue;
            }
            let timestamp_ns = s.timestamp_ns(frame_start_ns);
            if let Some(points) = scan_points.as_mut() {
                points.push(ScanPoint {
                    h_angle: s.h_angle,
                    v_angle: s.v_angle,
                    radius: s.radius,
                    timestamp_ns,
                    intensity: u32::from(s.reflectance),
                    flags: s.flags,
                    scan_id: s.scan_id,
                    scan_idx: s.scan_idx,
                });
            }
            if let Some(points) = cloud_points.as_mut() {
                let c = self.converter.convert(s.radius, s.h_angle, s.v_angle);
                points.push(PointXyzit {
                    x: c.x,
                    y: c.y,
                    z: c.z,
                    timestamp_ns,
                    intensity: u32::from(s.reflectance),
                    flags: s.flags,
                    scan_id: s.scan_id,
                    scan_idx: s.scan_idx,
                });
            }
        }

        FrameRecords {
            scan: scan_points.map(|points| ScanRecord {
                header: self.record_header(header),
                info: self.frame_info(header),
                points,
            }),
            pointcloud: cloud_points.map(|points| PointCloudRecord {
                header: self.record_header(header),
                info: self.frame_info(header),
                points,
            }),
            nan_dropped,
        }
    }

    /// 构造记录、填写发布时间并写入通道
    ///
    /// 返回点云（或扫描）记录中的点数。
    pub fn publish(
        &self,
        header: &FrameHeader,
        samples: impl IntoIterator<Item = PolarSample>,
    ) -> usize {
        let records = self.build_records(header, samples);
        self.metrics
            .nan_points_dropped
            .fetch_add(records.nan_dropped as u64, Ordering::Relaxed);

        let mut published = 0;
        if let (Some(mut scan), Some(sink)) = (records.scan, self.scan_sink.as_ref()) {
            scan.header.timestamp_sec = self.now_sec();
            published = scan.points.len();
            let scan = Arc::new(scan);
            self.last_scan.store(Some(scan.clone()));
            sink.write(scan);
        }
        if let (Some(mut cloud), Some(sink)) = (records.pointcloud, self.pointcloud_sink.as_ref()) {
            cloud.header.timestamp_sec = self.now_sec();
            published = cloud.points.len();
            self.metrics
                .points_published
                .fetch_add(published as u64, Ordering::Relaxed);
            let cloud = Arc::new(cloud);
            self.last_pointcloud.store(Some(cloud.clone()));
            sink.write(cloud);
        }
        self.metrics.frames_dispatched.fetch_add(1, Ordering::Relaxed);
        trace!(
            "[FrameDispatcher] frame seq={} published {} points",
            header.sequence_num(),
            published
        );
        published
    }

    /// 处理状态字符串
    ///
    /// 返回是否发布了 IMU 记录。解析失败从不向上传播。
    pub fn on_status(&self, status: &[u8]) -> bool {
        self.metrics.status_events.fetch_add(1, Ordering::Relaxed);
        let Some(sink) = self.imu_sink.as_ref() else {
            return false;
        };
        let Some(reading) = parse_status_lossy(status) else {
            return false;
        };

        let now_ns = self.clock.now_ns();
        let now_sec = now_ns as f64 / 1e9;
        let record = Arc::new(ImuRecord {
            header: RecordHeader {
                frame_id: self.config.frame_id.clone(),
                sequence_num: 0,
                lidar_timestamp_ns: now_ns,
                timestamp_sec: now_sec,
            },
            measurement_time: now_sec,
            reading,
        });
        self.metrics.imu_records.fetch_add(1, Ordering::Relaxed);
        self.last_imu.store(Some(record.clone()));
        sink.write(record);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReflectanceMode;
    use crate::records::ImuReading;
    use crate::sink::ChannelSink;
    use inno_protocol::{AlarmCode, AlarmLevel, AlarmMessage, CompactPointFields, FrameType};
    use rand::Rng;

    /// 固定时钟
    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_ns(&self) -> u64 {
            self.0
        }
    }

    const LOCAL_NS: u64 = 1_700_000_000_123_456_789;

    struct Harness {
        dispatcher: FrameDispatcher,
        scans: crossbeam_channel::Receiver<Arc<ScanRecord>>,
        clouds: crossbeam_channel::Receiver<Arc<PointCloudRecord>>,
        imus: crossbeam_channel::Receiver<Arc<ImuRecord>>,
    }

    fn harness(config: DriverConfig) -> Harness {
        let (scan_sink, scans) = ChannelSink::new(16);
        let (cloud_sink, clouds) = ChannelSink::new(16);
        let (imu_sink, imus) = ChannelSink::new(16);
        let dispatcher = FrameDispatcher::new(Arc::new(config))
            .unwrap()
            .with_clock(Arc::new(FixedClock(LOCAL_NS)))
            .with_scan_sink(Arc::new(scan_sink))
            .with_pointcloud_sink(Arc::new(cloud_sink))
            .with_imu_sink(Arc::new(imu_sink));
        Harness {
            dispatcher,
            scans,
            clouds,
            imus,
        }
    }

    fn config() -> DriverConfig {
        DriverConfig {
            lidar_model: "rev_k".into(),
            frame_id: "lidar_front".into(),
            lidar_id: 7,
            ..DriverConfig::default()
        }
    }

    fn frame(ts_us_start: f64, points: Vec<CompactPointFields>) -> Frame {
        let header = FrameHeader {
            idx: 42,
            ts_us_start,
            ts_us_end: ts_us_start + 100_000.0,
            ..FrameHeader::default()
        };
        Frame::from_compact_points(
            1,
            header,
            points.into_iter().map(CompactPoint::from_fields).collect(),
        )
    }

    fn random_points(n: usize) -> Vec<CompactPointFields> {
        let mut rng = rand::thread_rng();
        (0..n)
            .map(|_| CompactPointFields {
                radius: rng.gen_range(1..60_000),
                h_angle: rng.gen_range(-4096..4096),
                v_angle: rng.gen_range(-2048..2048),
                ts_100us: rng.gen_range(0..16384),
                scan_id: rng.gen_range(0..1024),
                flags: rng.gen_range(0..16),
                scan_idx: rng.gen_range(0..1024),
                reflectance: rng.r#gen(),
            })
            .collect()
    }

    #[test]
    fn test_correction_from_ms() {
        assert_eq!(TimestampCorrection::from_ms(0), TimestampCorrection::Disabled);
        assert_eq!(TimestampCorrection::from_ms(-5), TimestampCorrection::Always);
        assert_eq!(
            TimestampCorrection::from_ms(100),
            TimestampCorrection::Threshold(100_000_000)
        );
    }

    #[test]
    fn test_correction_threshold() {
        let c = TimestampCorrection::from_ms(100);
        let local_ns = 2_000_000_000_000;
        // 相差 50ms
        assert_eq!(c.correct(1_999_950_000.0, local_ns), None);
        // 相差恰好 100ms，不修正
        assert_eq!(c.correct(1_999_900_000.0, local_ns), None);
        // 相差 150ms（帧时间在本地时间之后也一样）
        assert_eq!(c.correct(2_000_150_000.0, local_ns), Some(2_000_000_000.0));
        assert_eq!(TimestampCorrection::Disabled.correct(0.0, local_ns), None);
    }

    /// 修正后的帧起始时间为本地时间截断到整微秒
    #[test]
    fn test_corrected_timestamp_rounding() {
        let h = harness(DriverConfig {
            time_fix_err_ms: -1,
            ..config()
        });
        let n = h.dispatcher.on_frame(&frame(5.0, random_points(2)));
        assert_eq!(n, 2);

        let cloud = h.clouds.try_recv().unwrap();
        assert_eq!(cloud.header.lidar_timestamp_ns, 1_700_000_000_123_456_000);
        assert_eq!(cloud.info.frame_ns_start, 1_700_000_000_123_456_000);
        assert_eq!(cloud.info.measurement_time, 1_700_000_000_123_456.0 * 1e-6);
        // 结束时间不被修正
        assert_eq!(cloud.info.frame_ns_end, 100_005_000);
        assert_eq!(
            h.dispatcher.metrics().snapshot().timestamp_corrections,
            1
        );
    }

    #[test]
    fn test_record_headers() {
        let h = harness(config());
        let f = frame(1_600_000_000_000_000.0, random_points(5));
        assert_eq!(h.dispatcher.on_frame(&f), 5);

        let scan = h.scans.try_recv().unwrap();
        let cloud = h.clouds.try_recv().unwrap();
        for (header, info) in [(&scan.header, &scan.info), (&cloud.header, &cloud.info)] {
            assert_eq!(header.frame_id, "lidar_front");
            assert_eq!(header.sequence_num, 42);
            assert_eq!(header.lidar_timestamp_ns, 1_600_000_000_000_000_000);
            assert_eq!(header.timestamp_sec, LOCAL_NS as f64 / 1e9);
            assert_eq!(info.idx, 42);
            assert_eq!(info.width, 5);
            assert_eq!(info.height, 1);
            assert_eq!(info.model, "rev_k");
            assert_eq!(info.source_id, 7);
            assert_eq!(info.frame_ns_end, 1_600_000_000_100_000_000);
            assert_eq!(info.reflectance, ReflectanceMode::Reflectivity);
        }
        assert_eq!(scan.points.len(), 5);
        assert_eq!(cloud.points.len(), 5);
        assert_eq!(h.dispatcher.last_pointcloud().unwrap(), cloud);
    }

    #[test]
    fn test_reflectance_mode_reaches_records() {
        let h = harness(DriverConfig {
            reflectance: ReflectanceMode::Intensity,
            ..config()
        });
        h.dispatcher.on_frame(&frame(1.0, random_points(1)));
        assert_eq!(
            h.scans.try_recv().unwrap().info.reflectance,
            ReflectanceMode::Intensity
        );
        assert_eq!(
            h.clouds.try_recv().unwrap().info.reflectance,
            ReflectanceMode::Intensity
        );
    }

    #[test]
    fn test_point_fields_and_timestamps() {
        let h = harness(config());
        let t0_us = 1_650_000_000_000_000.0;
        let t0_ns = 1_650_000_000_000_000_000u64;
        let fields = vec![
            CompactPointFields {
                radius: 1000,
                ts_100us: 0,
                reflectance: 9,
                ..Default::default()
            },
            CompactPointFields {
                radius: 2000,
                h_angle: 2048,
                ts_100us: 1,
                flags: 3,
                scan_id: 1023,
                scan_idx: 512,
                ..Default::default()
            },
            CompactPointFields {
                radius: 300,
                v_angle: -100,
                ts_100us: 16383,
                ..Default::default()
            },
        ];
        h.dispatcher.on_frame(&frame(t0_us, fields));

        let scan = h.scans.try_recv().unwrap();
        let cloud = h.clouds.try_recv().unwrap();
        let ts: Vec<u64> = cloud.points.iter().map(|p| p.timestamp_ns).collect();
        assert_eq!(ts, vec![t0_ns, t0_ns + 100_000, t0_ns + 16383 * 100_000]);
        assert_eq!(
            scan.points.iter().map(|p| p.timestamp_ns).collect::<Vec<_>>(),
            ts
        );

        assert_eq!(scan.points[0].intensity, 9);
        assert_eq!(scan.points[1].h_angle, 2048.0);
        assert_eq!(scan.points[1].radius, 2000.0);
        assert_eq!(scan.points[1].flags, 3);
        assert_eq!(scan.points[1].scan_id, 1023);
        assert_eq!(scan.points[1].scan_idx, 512);
        assert_eq!(scan.points[2].v_angle, -100.0);

        assert_eq!(cloud.points[0].z, 10.0);
        let expected = 20.0 * std::f64::consts::FRAC_PI_4.sin();
        assert!((cloud.points[1].y - expected).abs() < 1e-9);
    }

    #[test]
    fn test_nan_points_are_dropped() {
        let h = harness(config());
        let header = FrameHeader {
            item_number: 4,
            ts_us_start: 10.0,
            ..FrameHeader::new(FrameType::CompactPoint, 4)
        };
        let good = PolarSample {
            radius: 100.0,
            ..Default::default()
        };
        let samples = vec![
            good,
            PolarSample {
                radius: f64::NAN,
                ..good
            },
            PolarSample {
                h_angle: f64::NAN,
                ..good
            },
            PolarSample {
                v_angle: f64::NAN,
                ..good
            },
        ];
        assert_eq!(h.dispatcher.publish(&header, samples), 1);

        let scan = h.scans.try_recv().unwrap();
        let cloud = h.clouds.try_recv().unwrap();
        assert_eq!(scan.points.len(), 1);
        assert_eq!(cloud.points.len(), 1);
        // 宽度仍为声明的条目数
        assert_eq!(cloud.info.width, 4);
        assert!(cloud.points.iter().all(|p| !p.x.is_nan() && !p.z.is_nan()));
        assert_eq!(h.dispatcher.metrics().snapshot().nan_points_dropped, 3);
    }

    #[test]
    fn test_build_records_only_for_configured_sinks() {
        let (cloud_sink, clouds) = ChannelSink::<PointCloudRecord>::new(4);
        let dispatcher = FrameDispatcher::new(Arc::new(config()))
            .unwrap()
            .with_pointcloud_sink(Arc::new(cloud_sink));
        let header = FrameHeader::new(FrameType::CompactPoint, 1);
        let records = dispatcher.build_records(&header, [PolarSample::default()]);
        assert!(records.scan.is_none());
        assert_eq!(records.pointcloud.unwrap().points.len(), 1);
        // build_records 不写通道
        assert!(clouds.try_recv().is_err());
    }

    #[test]
    fn test_non_compact_frames_ignored() {
        let h = harness(config());
        let alarm = AlarmMessage::new(AlarmLevel::Warning, AlarmCode::SlowNetwork, "slow");
        let n = h.dispatcher.on_frame(&Frame::from_alarm(1, alarm));
        assert_eq!(n, 1);
        assert!(h.scans.try_recv().is_err());
        assert!(h.clouds.try_recv().is_err());
        assert_eq!(h.dispatcher.metrics().snapshot().frames_ignored, 1);
    }

    #[test]
    fn test_no_sinks_still_acknowledges() {
        let dispatcher = FrameDispatcher::new(Arc::new(config())).unwrap();
        assert!(!dispatcher.has_point_output());
        assert_eq!(dispatcher.on_frame(&frame(0.0, random_points(3))), 3);
        assert!(dispatcher.last_scan().is_none());
    }

    #[test]
    fn test_on_status_publishes_imu() {
        let h = harness(config());
        let status = br#"{"get-gyroscope-xyz": {"accel_x": 1, "accel_y": 2, "accel_z": 3,
            "gyro_x": -1, "gyro_y": -2, "gyro_z": -3}}"#;
        assert!(h.dispatcher.on_status(status));
        let imu = h.imus.try_recv().unwrap();
        assert_eq!(
            imu.reading,
            ImuReading {
                accel_x: 1,
                accel_y: 2,
                accel_z: 3,
                gyro_x: -1,
                gyro_y: -2,
                gyro_z: -3,
            }
        );
        assert_eq!(imu.measurement_time, LOCAL_NS as f64 / 1e9);
        assert_eq!(imu.header.frame_id, "lidar_front");

        // 格式错误：不发布，不报错
        assert!(!h.dispatcher.on_status(b"{\"get-gyroscope-xyz\": "));
        assert!(!h.dispatcher.on_status(b"{\"uptime\": 3}"));
        assert!(h.imus.try_recv().is_err());

        let snapshot = h.dispatcher.metrics().snapshot();
        assert_eq!(snapshot.status_events, 3);
        assert_eq!(snapshot.imu_records, 1);
    }

    #[test]
    fn test_fast_mode_close_to_exact() {
        let exact = harness(config());
        let fast = harness(DriverConfig {
            enable_fast_sin_cos: 1,
            ..config()
        });
        let f = frame(0.0, random_points(64));
        exact.dispatcher.on_frame(&f);
        fast.dispatcher.on_frame(&f);
        let a = exact.clouds.try_recv().unwrap();
        let b = fast.clouds.try_recv().unwrap();
        for (p, q) in a.points.iter().zip(b.points.iter()) {
            let r = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
            let bound = 2.34e-5 * r + 1e-12;
            assert!((p.x - q.x).abs() <= bound);
            assert!((p.y - q.y).abs() <= bound);
            assert!((p.z - q.z).abs() <= bound);
        }
    }
}
