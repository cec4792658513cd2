// 播放器核心模块

pub mod audio_output;
pub mod audio_pipeline;
pub mod controller;
#[cfg(feature = "ffmpeg")]
pub mod decoder;
#[cfg(feature = "ffmpeg")]
pub mod demuxer;
pub mod demuxer_source; // Demuxer / 解码器抽象接口
pub mod events;
pub mod free_gate;
pub mod packet_queue;
pub mod reader; // 读线程（解封装 + seek）
pub mod session;
pub mod video_pipeline;

pub use audio_output::{mix_audio_s16, mix_volume, AudioDevice, AudioSink, MIX_MAX_VOLUME};
#[cfg(feature = "audio-device")]
pub use audio_output::CpalAudioDevice;
pub use audio_pipeline::AudioPipeline;
pub use controller::PlayerController;
#[cfg(feature = "ffmpeg")]
pub use decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
#[cfg(feature = "ffmpeg")]
pub use demuxer::{FfmpegBackend, FfmpegDemuxer};
pub use demuxer_source::{AudioDecoder, DecodedPicture, DemuxerSource, MediaBackend, ReadOutcome, VideoDecoder};
pub use events::{EventSender, PlayerEvent};
pub use free_gate::{FreeGate, Subsystem};
pub use packet_queue::{PacketQueue, QueueStats};
pub use session::SessionShared;
pub use video_pipeline::VideoPipeline;
