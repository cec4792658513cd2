use crate::core::{Notifier, Packet};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// 线程安全的编码包队列（FIFO）
///
/// - 一把锁保护 push / pop / clear，三者互斥
/// - 队列本身不丢数据、不阻塞调用方：容量上限由读线程遵守（满了就不再读）
/// - 音频回调用 `pop_front_or_empty` 非阻塞取包；视频线程用 `pop_front_timeout`，
///   停止/seek 时通过 `interrupt` 叫醒
pub struct PacketQueue {
    capacity: usize,
    inner: Mutex<QueueInner>,
    /// 生产者 push 或 `interrupt` 后发信号
    pushed: Condvar,
    /// 消费者取走或清空后通知（读线程背压等待用）
    drained: Notifier,
}

struct QueueInner {
    packets: VecDeque<Packet>,
    stats: QueueStats,
    /// 下一次 `pop_front_timeout` 不再等待
    interrupted: bool,
}

/// 队列计数（用于核对每个包只被处理一次）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: u64,
    pub popped: u64,
    pub cleared: u64,
    /// 队列长度的历史最大值
    pub peak: usize,
}

impl QueueStats {
    /// 仍在队列中的包 = 推入 - 弹出 - 清空
    pub fn outstanding(&self) -> u64 {
        self.pushed - self.popped - self.cleared
    }
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(QueueInner {
                packets: VecDeque::new(),
                stats: QueueStats::default(),
                interrupted: false,
            }),
            pushed: Condvar::new(),
            drained: Notifier::new(),
        }
    }

    /// 追加到队尾并唤醒一个等待的消费者
    pub fn push(&self, packet: Packet) {
        let mut inner = self.inner.lock();
        inner.packets.push_back(packet);
        inner.stats.pushed += 1;
        inner.stats.peak = inner.stats.peak.max(inner.packets.len());
        drop(inner);
        self.pushed.notify_one();
    }

    /// 取出队头；队列为空时立即返回 None，不等待
    pub fn pop_front_or_empty(&self) -> Option<Packet> {
        let mut inner = self.inner.lock();
        let packet = inner.packets.pop_front();
        if packet.is_some() {
            inner.stats.popped += 1;
        }
        drop(inner);
        if packet.is_some() {
            self.drained.notify();
        }
        packet
    }

    /// 最多等待 `timeout` 取一个包
    ///
    /// 只给能容忍短暂阻塞的调用方用（上限由调用方给出），
    /// 音频回调线程不要用它。`interrupt` 会让等待立即返回。
    pub fn pop_front_timeout(&self, timeout: Duration) -> Option<Packet> {
        let mut inner = self.inner.lock();
        if inner.packets.is_empty() && !inner.interrupted {
            self.pushed.wait_for(&mut inner, timeout);
        }
        inner.interrupted = false;
        let packet = inner.packets.pop_front();
        if packet.is_some() {
            inner.stats.popped += 1;
        }
        drop(inner);
        if packet.is_some() {
            self.drained.notify();
        }
        packet
    }

    /// 叫醒正在（或即将）`pop_front_timeout` 的消费者，让它重新检查状态
    pub fn interrupt(&self) {
        let mut inner = self.inner.lock();
        inner.interrupted = true;
        drop(inner);
        self.pushed.notify_all();
    }

    /// 丢弃全部排队的包，返回丢弃数量
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.packets.len();
        inner.packets.clear();
        inner.stats.cleared += count as u64;
        drop(inner);
        self.drained.notify();
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().packets.is_empty()
    }

    /// 是否达到容量上限
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.lock().stats
    }

    /// 等待队列降到上限以下，最多等 `timeout`
    pub fn wait_not_full(&self, timeout: Duration) -> bool {
        self.drained.wait_until_timeout(timeout, timeout, || !self.is_full())
    }
}
