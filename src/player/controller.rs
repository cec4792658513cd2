use crate::core::{PlaybackState, PlayerConfig, PlayerError, Result};
use crate::player::audio_output::AudioDevice;
use crate::player::demuxer_source::MediaBackend;
use crate::player::events::{EventSender, PlayerEvent};
use crate::player::free_gate::Subsystem;
use crate::player::packet_queue::QueueStats;
use crate::player::reader::{FinishHook, Reader};
use crate::player::session::SessionShared;
use crossbeam_channel::Receiver;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 正在运行（或正在初始化）的会话
struct ActiveSession {
    reader: Option<JoinHandle<()>>,
    reader_id: ThreadId,
}

struct ControllerInner {
    backend: Arc<dyn MediaBackend>,
    device: Arc<Mutex<Box<dyn AudioDevice>>>,
    shared: Arc<SessionShared>,
    path: Mutex<Option<PathBuf>>,
    /// 同一时间只有一个会话；停止流程持有这把锁直到资源全部释放
    session: Mutex<Option<ActiveSession>>,
}

impl ControllerInner {
    fn stop(&self) {
        let mut slot = self.session.lock();
        self.stop_locked(&mut slot);
    }

    /// 停止流程：置 Stopped → 关设备 → 等其余子系统可释放 → 回收线程 → 重置会话字段
    fn stop_locked(&self, slot: &mut Option<ActiveSession>) {
        let Some(mut active) = slot.take() else {
            debug!("{} 没有正在运行的会话", log_ctx());
            return;
        };
        info!("{} ⏹️  停止播放", log_ctx());

        let shared = &self.shared;
        shared.set_stopping(true);
        shared.cancel();

        // 设备关闭后不会再调用音频回调，不用等回调自己看到 Stopped（设备可能已经不再拉取）
        self.device.lock().close();
        shared.gate.mark_freeable(Subsystem::Audio);

        shared.gate.wait_all();
        debug!("{} 所有子系统已退出", log_ctx());

        // 初始化中的读线程可能在上面关闭之后才打开设备
        self.device.lock().close();

        if let Some(handle) = shared.take_video_thread() {
            if handle.join().is_err() {
                warn!("{} ⚠️  视频线程 panic", log_ctx());
            }
        }
        // 自然播完时停止流程就跑在读线程上，不能等自己
        if active.reader_id != thread::current().id() {
            if let Some(handle) = active.reader.take() {
                if handle.join().is_err() {
                    warn!("{} ⚠️  读线程 panic", log_ctx());
                }
            }
        }

        shared.reset();
        info!("{} ✅ 停止播放完成，资源已释放", log_ctx());
    }

    /// 读线程退出时调用（播完或初始化失败）
    fn finish_from_reader(&self) {
        let poll = self.shared.config.sync_poll();
        loop {
            if let Some(mut slot) = self.session.try_lock_for(poll) {
                self.stop_locked(&mut slot);
                return;
            }
            // 别的线程正在停止，它会负责回收
            if self.shared.is_stopping() {
                return;
            }
        }
    }
}

/// 播放控制器
///
/// 状态机 Stopped → Playing ⇄ Paused → Stopped。
/// 从 Stopped 播放时启动读线程（读线程初始化完再启动视频线程），
/// 停止时同步等待所有子系统退出并释放资源。
pub struct PlayerController {
    inner: Arc<ControllerInner>,
}

impl PlayerController {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        device: Box<dyn AudioDevice>,
        config: PlayerConfig,
    ) -> (Self, Receiver<PlayerEvent>) {
        let (events, rx) = EventSender::channel();
        info!("{} 🎮 创建播放控制器", log_ctx());
        let inner = ControllerInner {
            backend,
            device: Arc::new(Mutex::new(device)),
            shared: Arc::new(SessionShared::new(config, events)),
            path: Mutex::new(None),
            session: Mutex::new(None),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// 记录要播放的文件（正在播放的会话会先停止）
    pub fn open(&self, path: impl AsRef<Path>) {
        self.stop();
        let path = path.as_ref().to_path_buf();
        info!("{} 📂 打开媒体文件: {}", log_ctx(), path.display());
        *self.inner.path.lock() = Some(path);
    }

    /// 播放
    ///
    /// Playing 时什么都不做；Paused 时恢复；Stopped 时重新打开文件开始一个新会话。
    pub fn play(&self) -> Result<()> {
        let inner = &self.inner;
        let mut slot = inner.session.lock();

        match inner.shared.state() {
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Paused => {
                info!("{} ▶️  继续播放", log_ctx());
                inner.shared.transition(PlaybackState::Paused, PlaybackState::Playing);
                return Ok(());
            }
            PlaybackState::Stopped => {}
        }
        if slot.is_some() {
            debug!("{} 会话正在初始化，忽略重复的播放请求", log_ctx());
            return Ok(());
        }

        let path = inner
            .path
            .lock()
            .clone()
            .ok_or_else(|| PlayerError::Other("没有打开的文件，无法播放".to_string()))?;
        info!("{} 🎬 播放: {}", log_ctx(), path.display());

        inner.shared.gate.arm(Subsystem::Container);
        let weak: Weak<ControllerInner> = Arc::downgrade(inner);
        let on_finish: FinishHook = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.finish_from_reader();
            }
        });
        let reader = Reader::new(
            inner.shared.clone(),
            inner.backend.clone(),
            inner.device.clone(),
            path,
            on_finish,
        );

        let handle = match thread::Builder::new()
            .name("reader".to_string())
            .spawn(move || reader.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                inner.shared.reset();
                return Err(e.into());
            }
        };
        *slot = Some(ActiveSession {
            reader_id: handle.thread().id(),
            reader: Some(handle),
        });
        Ok(())
    }

    /// 暂停（只在 Playing 时有效）
    pub fn pause(&self) {
        if self
            .inner
            .shared
            .transition(PlaybackState::Playing, PlaybackState::Paused)
        {
            info!("{} ⏸️  暂停", log_ctx());
        }
    }

    /// 停止（幂等），返回时会话资源已全部释放
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// 请求跳转到 `seconds`（后写覆盖先写），由读线程执行
    pub fn seek(&self, seconds: i64) {
        info!("{} 🎯 Seek 请求: {}s", log_ctx(), seconds);
        self.inner.shared.clock.request_seek(seconds);
        self.inner.shared.wake_all();
    }

    /// 音量 0..=100
    pub fn set_volume(&self, volume: u8) {
        self.inner.shared.set_volume(volume);
    }

    pub fn volume(&self) -> u8 {
        self.inner.shared.volume()
    }

    pub fn set_mute(&self, muted: bool) {
        self.inner.shared.set_muted(muted);
    }

    pub fn is_mute(&self) -> bool {
        self.inner.shared.is_muted()
    }

    /// 总时长（秒），没有打开的容器时为 0
    pub fn duration(&self) -> i64 {
        self.inner.shared.duration()
    }

    /// 当前音频时钟（秒，四舍五入）
    pub fn time(&self) -> i64 {
        self.inner.shared.clock.audio_time().round() as i64
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.shared.state()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlaybackState::Playing
    }

    /// 音频、视频包队列的累计计数
    pub fn queue_stats(&self) -> (QueueStats, QueueStats) {
        let shared = &self.inner.shared;
        (shared.audio_queue.stats(), shared.video_queue.stats())
    }
}

impl Drop for PlayerController {
    fn drop(&mut self) {
        self.stop();
    }
}
