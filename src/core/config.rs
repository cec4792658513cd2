use crate::core::{AudioSpec, PixelFormat, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 播放内核配置
///
/// 音频输出格式固定（44100Hz / 立体声 / S16），重采样总是转换到这个格式，
/// 不跟设备协商。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// 音频包队列上限（读线程达到后不再读取）
    pub audio_queue_capacity: usize,
    /// 视频包队列上限
    pub video_queue_capacity: usize,
    /// 音频设备输出格式
    pub audio_output: AudioSpec,
    /// 重采样输出缓冲区容量（每声道样本数）
    pub audio_chunk_capacity_samples: usize,
    /// 解码/重采样失败时补的静音字节数
    pub silence_chunk_bytes: usize,
    /// 渲染方要求的像素格式
    pub video_pixel_format: PixelFormat,
    /// 队列满时读线程的退避等待（毫秒）
    pub backpressure_backoff_ms: u64,
    /// 条件变量单次等待上限（毫秒），醒来后重新检查条件
    pub sync_poll_ms: u64,
    /// 初始音量 0..=100
    pub initial_volume: u8,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            audio_queue_capacity: 1000,
            video_queue_capacity: 500,
            audio_output: AudioSpec::default(),
            audio_chunk_capacity_samples: 4096,
            silence_chunk_bytes: 1024,
            video_pixel_format: PixelFormat::RGB24,
            backpressure_backoff_ms: 2,
            sync_poll_ms: 5,
            initial_volume: 100,
        }
    }
}

impl PlayerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// 修正明显不合理的取值
    fn sanitized(mut self) -> Self {
        self.audio_queue_capacity = self.audio_queue_capacity.max(1);
        self.video_queue_capacity = self.video_queue_capacity.max(1);
        self.audio_chunk_capacity_samples = self.audio_chunk_capacity_samples.max(1);
        self.initial_volume = self.initial_volume.min(100);
        self.sync_poll_ms = self.sync_poll_ms.max(1);
        self.backpressure_backoff_ms = self.backpressure_backoff_ms.max(1);
        self
    }

    /// 重采样输出缓冲区的字节容量
    pub fn audio_chunk_capacity_bytes(&self) -> usize {
        (self.audio_chunk_capacity_samples * self.audio_output.bytes_per_sample_frame())
            .max(self.silence_chunk_bytes)
    }

    pub fn backpressure_backoff(&self) -> Duration {
        Duration::from_millis(self.backpressure_backoff_ms)
    }

    pub fn sync_poll(&self) -> Duration {
        Duration::from_millis(self.sync_poll_ms)
    }
}
