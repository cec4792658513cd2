//! 播放器解码与音画同步内核
//!
//! 一个读线程解封装，两个有界包队列，音频由设备回调拉取，视频由独立线程解码，
//! 音频时钟为主时钟。

pub mod core;
pub mod player;

pub use crate::core::{
    AudioSpec, DecodedVideoFrame, MediaInfo, Packet, PixelFormat, PlaybackState, PlayerConfig, PlayerError,
    Result, StreamKind,
};
pub use crate::player::{PlayerController, PlayerEvent};
