use crate::core::{Notifier, PlaybackState, PlayerConfig, SessionClock};
use crate::player::events::{EventSender, PlayerEvent};
use crate::player::free_gate::FreeGate;
use crate::player::packet_queue::PacketQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::thread::JoinHandle;

struct Status {
    state: PlaybackState,
    /// 本会话已被停止（可能发生在初始化还没结束时）
    cancelled: bool,
}

/// 一个播放会话里读线程、音频回调、视频线程共享的状态
///
/// 控制器持有一份，跨会话复用：停止时 `reset` 回初始值。
/// 音量/静音不属于会话，不会被重置。
pub struct SessionShared {
    pub config: PlayerConfig,
    pub clock: SessionClock,
    pub audio_queue: PacketQueue,
    pub video_queue: PacketQueue,
    pub gate: FreeGate,
    /// 播放状态变化（暂停等待用）
    pub state_changed: Notifier,
    /// 时钟推进或 seek 完成（音画同步等待用）
    pub clock_changed: Notifier,
    events: EventSender,
    status: Mutex<Status>,
    volume: AtomicU8,
    muted: AtomicBool,
    has_audio: AtomicBool,
    has_video: AtomicBool,
    duration: AtomicI64,
    stopping: AtomicBool,
    video_thread: Mutex<Option<JoinHandle<()>>>,
}

impl SessionShared {
    pub fn new(config: PlayerConfig, events: EventSender) -> Self {
        Self {
            clock: SessionClock::new(),
            audio_queue: PacketQueue::new(config.audio_queue_capacity),
            video_queue: PacketQueue::new(config.video_queue_capacity),
            gate: FreeGate::new(),
            state_changed: Notifier::new(),
            clock_changed: Notifier::new(),
            events,
            status: Mutex::new(Status {
                state: PlaybackState::Stopped,
                cancelled: false,
            }),
            volume: AtomicU8::new(config.initial_volume.min(100)),
            muted: AtomicBool::new(false),
            has_audio: AtomicBool::new(false),
            has_video: AtomicBool::new(false),
            duration: AtomicI64::new(0),
            stopping: AtomicBool::new(false),
            video_thread: Mutex::new(None),
            config,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.status.lock().state
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == PlaybackState::Stopped
    }

    pub fn emit(&self, event: PlayerEvent) {
        self.events.send(event);
    }

    /// 状态从 `from` 切到 `to`，成功时发出状态通知
    pub fn transition(&self, from: PlaybackState, to: PlaybackState) -> bool {
        let mut status = self.status.lock();
        if status.state != from || status.cancelled {
            return false;
        }
        status.state = to;
        self.events.send(PlayerEvent::StateChanged(to));
        drop(status);
        self.state_changed.notify();
        true
    }

    /// 初始化完成后进入 Playing；会话在初始化期间已被停止则返回 false
    pub fn begin_playing(&self) -> bool {
        self.transition(PlaybackState::Stopped, PlaybackState::Playing)
    }

    /// 停止会话，返回状态是否真的发生了变化
    pub fn cancel(&self) -> bool {
        let mut status = self.status.lock();
        status.cancelled = true;
        let changed = status.state != PlaybackState::Stopped;
        status.state = PlaybackState::Stopped;
        if changed {
            self.events.send(PlayerEvent::StateChanged(PlaybackState::Stopped));
        }
        drop(status);
        self.wake_all();
        changed
    }

    /// 唤醒所有等待方，让它们重新检查状态
    pub fn wake_all(&self) {
        self.state_changed.notify();
        self.clock_changed.notify();
        // 视频线程可能睡在取包上
        self.video_queue.interrupt();
    }

    pub fn volume(&self) -> u8 {
        self.volume.load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, volume: u8) {
        self.volume.store(volume.min(100), Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn has_audio(&self) -> bool {
        self.has_audio.load(Ordering::Acquire)
    }

    pub fn set_has_audio(&self, value: bool) {
        self.has_audio.store(value, Ordering::Release);
    }

    pub fn has_video(&self) -> bool {
        self.has_video.load(Ordering::Acquire)
    }

    pub fn set_has_video(&self, value: bool) {
        self.has_video.store(value, Ordering::Release);
    }

    /// 容器时长（秒），没有打开的容器时为 0
    pub fn duration(&self) -> i64 {
        self.duration.load(Ordering::Acquire)
    }

    pub fn set_duration(&self, seconds: i64) {
        self.duration.store(seconds.max(0), Ordering::Release);
    }

    /// 停止流程正在进行
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub fn set_stopping(&self, value: bool) {
        self.stopping.store(value, Ordering::Release);
    }

    pub fn set_video_thread(&self, handle: JoinHandle<()>) {
        *self.video_thread.lock() = Some(handle);
    }

    pub fn take_video_thread(&self) -> Option<JoinHandle<()>> {
        self.video_thread.lock().take()
    }

    /// 恢复所有会话字段的初始值（资源已释放之后调用）
    pub fn reset(&self) {
        let dropped = self.audio_queue.clear() + self.video_queue.clear();
        if dropped > 0 {
            log::debug!("释放会话时丢弃 {} 个未解码的包", dropped);
        }
        self.clock.reset();
        self.gate.reset();
        self.has_audio.store(false, Ordering::Release);
        self.has_video.store(false, Ordering::Release);
        self.duration.store(0, Ordering::Release);
        *self.status.lock() = Status {
            state: PlaybackState::Stopped,
            cancelled: false,
        };
        self.stopping.store(false, Ordering::Release);
    }
}
