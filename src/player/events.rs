use crate::core::{DecodedVideoFrame, PlaybackState};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::trace;

/// 播放器发给外部（界面/渲染方）的通知
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// 播放状态改变
    StateChanged(PlaybackState),
    /// 观察到新的音频时间戳（秒）
    TimeChanged(f64),
    /// 流初始化完毕，附带总时长（秒）
    InitFinished { duration: i64 },
    /// 打开失败（没有可用的音频流和视频流）
    PlayFailed,
    /// 一帧转换好的画面，所有权移交给接收方
    FrameReady(DecodedVideoFrame),
}

/// 通知发送端
///
/// 接收端被丢弃后发送静默失败，播放不受影响。
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<PlayerEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<PlayerEvent>) -> Self {
        Self { tx }
    }

    /// 创建一对无界通道
    pub fn channel() -> (Self, Receiver<PlayerEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self::new(tx), rx)
    }

    pub fn send(&self, event: PlayerEvent) {
        if let Err(TrySendError::Disconnected(event)) = self.tx.try_send(event) {
            trace!("通知接收端已关闭，丢弃 {:?}", std::mem::discriminant(&event));
        }
    }
}
