use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

const NO_SEEK: i64 = -1;

/// 原子 f64（按位存进 AtomicU64）
struct AtomicSeconds(AtomicU64);

impl AtomicSeconds {
    fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// 一个 seek 目标（秒），-1 表示没有
struct SeekSlot(AtomicI64);

impl SeekSlot {
    fn new() -> Self {
        Self(AtomicI64::new(NO_SEEK))
    }

    fn get(&self) -> Option<i64> {
        match self.0.load(Ordering::Acquire) {
            v if v >= 0 => Some(v),
            _ => None,
        }
    }

    fn set(&self, seconds: i64) {
        self.0.store(seconds.max(0), Ordering::Release);
    }

    fn take(&self) -> Option<i64> {
        match self.0.swap(NO_SEEK, Ordering::AcqRel) {
            v if v >= 0 => Some(v),
            _ => None,
        }
    }

    fn clear(&self) {
        self.0.store(NO_SEEK, Ordering::Release);
    }
}

/// 会话时钟 - 用于音视频同步
///
/// - `audio_time` 由音频回调（seek 时由读线程清零）写入
/// - `video_time` 由视频线程写入
/// - 两边互相读取只用于同步判断，读到旧值是可以接受的，同步门会不断重新判断
///
/// seek 目标由控制器写入、读线程消费一次，然后分发给音视频各自的本地标记。
pub struct SessionClock {
    audio_time: AtomicSeconds,
    video_time: AtomicSeconds,
    pending_seek: SeekSlot,
    audio_seek: SeekSlot,
    video_seek: SeekSlot,
    /// 每完成一次 seek 加一，管线据此冲刷解码器、丢弃 seek 前弹出的包
    seek_serial: AtomicU64,
    /// seek 完成与按序号写时钟互斥
    transition: Mutex<()>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            audio_time: AtomicSeconds::new(0.0),
            video_time: AtomicSeconds::new(0.0),
            pending_seek: SeekSlot::new(),
            audio_seek: SeekSlot::new(),
            video_seek: SeekSlot::new(),
            seek_serial: AtomicU64::new(0),
            transition: Mutex::new(()),
        }
    }

    /// 音频时钟（秒）
    pub fn audio_time(&self) -> f64 {
        self.audio_time.load()
    }

    #[cfg(test)]
    pub(crate) fn set_audio_time(&self, seconds: f64) {
        self.audio_time.store(seconds);
    }

    /// 只在 seek 序号仍为 `serial` 时更新音频时钟，返回是否写入
    ///
    /// seek 前弹出的包解码完成得晚，不能覆盖 seek 后归零的时钟。
    pub fn set_audio_time_at(&self, serial: u64, seconds: f64) -> bool {
        let _guard = self.transition.lock();
        if self.seek_serial() != serial {
            return false;
        }
        self.audio_time.store(seconds);
        true
    }

    /// 视频时钟（秒）
    pub fn video_time(&self) -> f64 {
        self.video_time.load()
    }

    #[cfg(test)]
    pub(crate) fn set_video_time(&self, seconds: f64) {
        self.video_time.store(seconds);
    }

    pub fn set_video_time_at(&self, serial: u64, seconds: f64) -> bool {
        let _guard = self.transition.lock();
        if self.seek_serial() != serial {
            return false;
        }
        self.video_time.store(seconds);
        true
    }

    /// 请求 seek（后写覆盖先写）
    pub fn request_seek(&self, seconds: i64) {
        self.pending_seek.set(seconds);
    }

    pub fn pending_seek(&self) -> Option<i64> {
        self.pending_seek.get()
    }

    /// 取出待处理的 seek 目标（只会被读线程消费一次）
    pub fn take_pending_seek(&self) -> Option<i64> {
        self.pending_seek.take()
    }

    /// seek 成功：记录两个本地标记，时钟归零，序号加一
    ///
    /// 调用方必须先清空两个包队列再调用这里，否则消费者可能抢到旧包，
    /// 用旧时间戳覆盖刚归零的时钟。
    pub fn complete_seek(&self, target: i64) {
        let _guard = self.transition.lock();
        self.audio_seek.set(target);
        self.video_seek.set(target);
        self.audio_time.store(0.0);
        self.video_time.store(0.0);
        self.seek_serial.fetch_add(1, Ordering::AcqRel);
    }

    pub fn audio_seek(&self) -> Option<i64> {
        self.audio_seek.get()
    }

    pub fn clear_audio_seek(&self) {
        self.audio_seek.clear();
    }

    pub fn video_seek(&self) -> Option<i64> {
        self.video_seek.get()
    }

    pub fn clear_video_seek(&self) {
        self.video_seek.clear();
    }

    pub fn seek_serial(&self) -> u64 {
        self.seek_serial.load(Ordering::Acquire)
    }

    /// 恢复初始值（会话释放时调用）
    pub fn reset(&self) {
        self.audio_time.store(0.0);
        self.video_time.store(0.0);
        self.pending_seek.clear();
        self.audio_seek.clear();
        self.video_seek.clear();
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
