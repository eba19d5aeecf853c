//! 录制文件回放
//!
//! 文件内容与 TCP 字节流相同（魔数 + 连续三段式帧）。

use crate::stream::StreamFrameReader;
use crate::{FrameSource, SourceEvent, TransportError, frame_event};
use inno_protocol::{AlarmCode, AlarmLevel, AlarmMessage, Frame};
use spin_sleep::SpinSleeper;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 文件读完时上报的告警消息
pub const END_OF_FILE_MESSAGE: &str = "end of file";

/// 回放参数
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// 回放速度倍率，0 表示不限速
    pub speed: f64,
    /// 额外回放次数，负数表示无限循环
    pub rewind: i32,
    /// 跳过文件开头的时长（毫秒，按帧起始时间计算）
    pub skip_ms: u64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            speed: 1.0,
            rewind: 0,
            skip_ms: 0,
        }
    }
}

/// 帧时间与墙钟时间的对齐基准
#[derive(Debug, Clone, Copy)]
struct PaceAnchor {
    wall: Instant,
    frame_us: f64,
}

/// 录制文件帧源
pub struct ReplaySource {
    path: PathBuf,
    options: ReplayOptions,
    reader: StreamFrameReader<BufReader<File>>,
    rewinds_left: i32,
    anchor: Option<PaceAnchor>,
    first_frame_us: Option<f64>,
    /// 本轮已交付的帧数
    pass_frames: u64,
    /// 尚未到投递时间的帧
    pending: Option<Frame>,
    finished: bool,
    sleeper: SpinSleeper,
}

impl ReplaySource {
    pub fn open(path: impl AsRef<Path>, options: ReplayOptions) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let reader = Self::open_reader(&path)?;
        info!(
            "[ReplaySource] open {} speed={} rewind={} skip={}ms",
            path.display(),
            options.speed,
            options.rewind,
            options.skip_ms
        );
        Ok(Self {
            path,
            rewinds_left: options.rewind,
            options,
            reader,
            anchor: None,
            first_frame_us: None,
            pass_frames: 0,
            pending: None,
            finished: false,
            sleeper: SpinSleeper::default(),
        })
    }

    fn open_reader(path: &Path) -> Result<StreamFrameReader<BufReader<File>>, TransportError> {
        let file = File::open(path)?;
        Ok(StreamFrameReader::new(BufReader::new(file)))
    }

    /// 重新从头开始
    fn rewind(&mut self) -> Result<(), TransportError> {
        self.reader = Self::open_reader(&self.path)?;
        self.anchor = None;
        self.first_frame_us = None;
        self.pass_frames = 0;
        if self.rewinds_left > 0 {
            self.rewinds_left -= 1;
        }
        debug!("[ReplaySource] rewind {}", self.path.display());
        Ok(())
    }

    /// 是否处于跳过区间
    fn skipping(&mut self, frame_us: f64) -> bool {
        let first = *self.first_frame_us.get_or_insert(frame_us);
        frame_us - first < self.options.skip_ms.saturating_mul(1000) as f64
    }

    /// 按帧时间戳计算的投递时刻，不限速时为 `None`
    fn pace_target(&mut self, frame_us: f64) -> Option<Instant> {
        if self.options.speed <= 0.0 {
            return None;
        }
        let anchor = *self.anchor.get_or_insert(PaceAnchor {
            wall: Instant::now(),
            frame_us,
        });
        let offset_us = (frame_us - anchor.frame_us) / self.options.speed;
        if offset_us <= 0.0 || !offset_us.is_finite() {
            return None;
        }
        Some(anchor.wall + Duration::from_secs_f64(offset_us / 1_000_000.0))
    }

    /// 等到投递时刻再交付；超过 `deadline` 时暂存该帧并返回 `None`
    fn deliver(&mut self, frame: Frame, deadline: Instant) -> Option<SourceEvent> {
        if let Some(target) = self.pace_target(frame.header.ts_us_start) {
            let now = Instant::now();
            if target > deadline {
                if deadline > now {
                    self.sleeper.sleep(deadline - now);
                }
                self.pending = Some(frame);
                return None;
            }
            if target > now {
                self.sleeper.sleep(target - now);
            }
        }
        Some(frame_event(frame))
    }

    fn end_of_file(&mut self) -> SourceEvent {
        self.finished = true;
        info!("[ReplaySource] {} reached end of file", self.path.display());
        SourceEvent::Alarm(AlarmMessage::new(
            AlarmLevel::Warning,
            AlarmCode::CannotRead,
            END_OF_FILE_MESSAGE,
        ))
    }
}

impl FrameSource for ReplaySource {
    fn next_event(&mut self, timeout: Duration) -> Result<Option<SourceEvent>, TransportError> {
        if self.finished {
            return Err(TransportError::EndOfStream);
        }
        let deadline = Instant::now() + timeout;
        if let Some(frame) = self.pending.take() {
            return Ok(self.deliver(frame, deadline));
        }
        loop {
            match self.reader.read_frame() {
                Ok(frame) => {
                    if self.skipping(frame.header.ts_us_start) {
                        if Instant::now() >= deadline {
                            return Ok(None);
                        }
                        continue;
                    }
                    self.pass_frames += 1;
                    return Ok(self.deliver(frame, deadline));
                },
                Err(TransportError::EndOfStream) => {
                    if self.pass_frames == 0 {
                        // 整轮没有可交付的帧，重绕也不会有
                        if self.rewinds_left != 0 {
                            warn!(
                                "[ReplaySource] {} has no frames to replay, not rewinding",
                                self.path.display()
                            );
                        }
                        return Ok(Some(self.end_of_file()));
                    }
                    if self.rewinds_left != 0 {
                        self.rewind()?;
                        continue;
                    }
                    return Ok(Some(self.end_of_file()));
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}
