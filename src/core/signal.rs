use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// 条件变量通知器
///
/// 用来代替忙等：等待方在锁内检查条件，不满足就睡在条件变量上，
/// 被唤醒（或等待超时）后重新检查。通知方修改状态后调用 `notify`，
/// 序号在锁内递增，不会丢失唤醒。
pub struct Notifier {
    seq: Mutex<u64>,
    cv: Condvar,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            seq: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    /// 唤醒所有等待方
    pub fn notify(&self) {
        let mut seq = self.seq.lock();
        *seq = seq.wrapping_add(1);
        self.cv.notify_all();
    }

    /// 等待直到 `ready()` 为真
    ///
    /// `poll` 是单次睡眠上限：有些条件（比如队列被消费）没有对应的通知，
    /// 超时后会重新检查一次。
    pub fn wait_until(&self, poll: Duration, mut ready: impl FnMut() -> bool) {
        let mut seq = self.seq.lock();
        while !ready() {
            self.cv.wait_for(&mut seq, poll);
        }
    }

    /// 同 `wait_until`，但最多等待 `timeout`，返回条件最终是否满足
    pub fn wait_until_timeout(
        &self,
        poll: Duration,
        timeout: Duration,
        mut ready: impl FnMut() -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut seq = self.seq.lock();
        loop {
            if ready() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.cv.wait_for(&mut seq, poll.min(deadline - now));
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
