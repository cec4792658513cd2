use log::{error, warn};
use parking_lot::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// 会话里持有资源的三个子系统
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Audio,
    Video,
    Container,
}

impl Subsystem {
    fn slot(self) -> usize {
        match self {
            Subsystem::Audio => 0,
            Subsystem::Video => 1,
            Subsystem::Container => 2,
        }
    }
}

#[derive(Default)]
struct GateState {
    /// 本会话实际启动了的子系统，只等待这些
    armed: [bool; 3],
    /// 子系统已退出循环、不会再碰自己的资源
    freeable: [bool; 3],
}

/// 资源释放闸门
///
/// 每个子系统退出循环后调用 `mark_freeable`；停止流程在 `wait_all` 上等待，
/// 所有已启动的子系统都可释放后才真正释放解码器/队列/容器。
pub struct FreeGate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl FreeGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::default()),
            cv: Condvar::new(),
        }
    }

    /// 标记子系统已启动（之后停止流程会等待它）
    pub fn arm(&self, subsystem: Subsystem) {
        let mut state = self.state.lock();
        state.armed[subsystem.slot()] = true;
    }

    /// 子系统声明：之后再也不会访问自己的资源
    pub fn mark_freeable(&self, subsystem: Subsystem) {
        let mut state = self.state.lock();
        state.freeable[subsystem.slot()] = true;
        drop(state);
        self.cv.notify_all();
    }

    /// 作用域结束（包括 panic 展开）时自动标记可释放
    pub fn guard(&self, subsystem: Subsystem) -> FreeGuard<'_> {
        FreeGuard { gate: self, subsystem }
    }

    pub fn is_freeable(&self, subsystem: Subsystem) -> bool {
        self.state.lock().freeable[subsystem.slot()]
    }

    fn all_released(state: &GateState) -> bool {
        state
            .armed
            .iter()
            .zip(state.freeable.iter())
            .all(|(armed, freeable)| !armed || *freeable)
    }

    /// 阻塞直到所有已启动的子系统都可释放
    ///
    /// 没有超时：等待时间过长只打日志。
    pub fn wait_all(&self) {
        let started = Instant::now();
        let mut warned_at = Duration::ZERO;
        let mut state = self.state.lock();
        while !Self::all_released(&state) {
            self.cv.wait_for(&mut state, Duration::from_millis(500));
            let waited = started.elapsed();
            if waited.as_secs() >= 2 && waited - warned_at >= Duration::from_secs(2) {
                warned_at = waited;
                warn!(
                    "⚠️  等待资源释放已 {:?}: armed={:?} freeable={:?}",
                    waited, state.armed, state.freeable
                );
            }
        }
    }

    /// 恢复初始值（下一个会话重新使用）
    pub fn reset(&self) {
        *self.state.lock() = GateState::default();
    }
}

/// 见 [`FreeGate::guard`]
pub struct FreeGuard<'a> {
    gate: &'a FreeGate,
    subsystem: Subsystem,
}

impl Drop for FreeGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("❌ {:?} 子系统异常退出", self.subsystem);
        }
        self.gate.mark_freeable(self.subsystem);
    }
}

impl Default for FreeGate {
    fn default() -> Self {
        Self::new()
    }
}
