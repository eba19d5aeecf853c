//! 驱动状态机
//!
//! - [`DriverState`]：连接生命周期，原子保存，任意线程可读
//! - [`RunSignal`]：告警驱动的运行标志 + 条件变量，供监督者等待停止请求

use inno_protocol::{AlarmCode, AlarmLevel, AlarmMessage};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// 回放结束时告警消息的前缀
const END_OF_FILE_PREFIX: &str = "end of file";

// ============================================================================
// 生命周期状态
// ============================================================================

/// 驱动生命周期状态
///
/// ```text
/// Uninitialized → Initializing → Streaming ⇄ Paused
///                      │              │
///                      └──→ Error ←───┘
///                 (任意状态) → Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DriverState {
    #[default]
    Uninitialized = 0,
    /// 正在打开帧源，或已打开但尚未开始投递
    Initializing = 1,
    /// 投递线程运行中
    Streaming = 2,
    /// 帧源保持打开，投递线程已退出
    Paused = 3,
    /// 帧源已释放
    Stopped = 4,
    /// 严重告警或致命传输错误
    Error = 5,
}

impl DriverState {
    /// 从 u8 转换，无效值视为 Error
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Streaming,
            3 => Self::Paused,
            4 => Self::Stopped,
            _ => Self::Error,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_streaming(self) -> bool {
        self == Self::Streaming
    }
}

/// 驱动状态（原子版本，用于线程间共享）
#[derive(Debug)]
pub struct AtomicDriverState {
    inner: AtomicU8,
}

impl AtomicDriverState {
    pub fn new(state: DriverState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> DriverState {
        DriverState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: DriverState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }

    /// 比较并交换
    pub fn compare_exchange(
        &self,
        current: DriverState,
        new: DriverState,
        success: Ordering,
        failure: Ordering,
    ) -> Result<DriverState, DriverState> {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .map(DriverState::from_u8)
            .map_err(DriverState::from_u8)
    }
}

impl Default for AtomicDriverState {
    fn default() -> Self {
        Self::new(DriverState::Uninitialized)
    }
}

// ============================================================================
// 运行标志
// ============================================================================

/// 告警驱动的运行标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum RunState {
    /// 尚未收到任何告警或已停止
    #[default]
    Idle = 0,
    /// 收到普通告警，继续运行
    Healthy = 1,
    /// 严重告警，需要监督者停止并重新打开
    ErrorStop = -1,
    /// 读完回放文件或无法读取，正常结束
    GracefulStop = -2,
}

impl RunState {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// 是否为停止请求
    pub fn is_stop(self) -> bool {
        matches!(self, Self::ErrorStop | Self::GracefulStop)
    }
}

/// 根据告警计算运行标志
///
/// 1. 无法读取，且消息以 "end of file" 开头或当前为回放：正常结束
/// 2. 级别不低于 Critical（库版本不匹配除外）：错误停止
/// 3. 其他：继续运行
pub fn evaluate_alarm(alarm: &AlarmMessage, replay: bool) -> RunState {
    if alarm.code == AlarmCode::CannotRead
        && (alarm.message.starts_with(END_OF_FILE_PREFIX) || replay)
    {
        RunState::GracefulStop
    } else if alarm.level >= AlarmLevel::Critical && alarm.code != AlarmCode::LibVersionMismatch {
        RunState::ErrorStop
    } else {
        RunState::Healthy
    }
}

/// 运行标志 + 条件变量
///
/// 告警回调设置标志并唤醒所有等待者；停止请求一旦设置，
/// 后续的普通告警不会把它覆盖回 `Healthy`，直到 [`RunSignal::reset`]。
#[derive(Debug, Default)]
pub struct RunSignal {
    state: Mutex<RunState>,
    cv: Condvar,
}

impl RunSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> RunState {
        *self.state.lock()
    }

    /// 设置标志并唤醒等待者，返回实际生效的状态
    pub fn signal(&self, next: RunState) -> RunState {
        let mut state = self.state.lock();
        if !(state.is_stop() && next == RunState::Healthy) {
            *state = next;
        }
        let current = *state;
        self.cv.notify_all();
        current
    }

    /// 强制回到 `Idle`
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = RunState::Idle;
        self.cv.notify_all();
    }

    /// 等待停止请求
    ///
    /// 超时返回 `None`。
    pub fn wait_for_stop(&self, timeout: Duration) -> Option<RunState> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.is_stop() {
            if self.cv.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.is_stop().then_some(*state)
    }
}
