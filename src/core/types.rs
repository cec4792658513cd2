use serde::{Deserialize, Serialize};
use std::fmt;

/// 流类型（本内核只跟踪音频、视频两路）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Audio,
    Video,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Audio => "audio",
            StreamKind::Video => "video",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 时间基（时间戳单位，秒 = ts * num / den）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 时间基换算成秒
    pub fn as_f64(&self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// 时间戳 → 秒
    pub fn to_seconds(&self, ts: i64) -> f64 {
        ts as f64 * self.as_f64()
    }

    /// 秒 → 时间戳（向零取整）
    pub fn from_seconds(&self, seconds: f64) -> i64 {
        if self.num == 0 || self.den == 0 {
            return 0;
        }
        (seconds * self.den as f64 / self.num as f64) as i64
    }
}

/// 一个编码包（一个访问单元）
///
/// 所有权：读线程创建后移动进唯一一个队列槽位，
/// 之后被消费者弹出并解码，或者在清空队列时丢弃。
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream_index: usize,
    pub data: Vec<u8>,
    pub pts: Option<i64>,
    pub dts: Option<i64>,
    pub duration: i64,
    pub time_base: TimeBase,
    pub is_key: bool,
}

impl Packet {
    pub fn new(stream_index: usize, data: Vec<u8>, time_base: TimeBase) -> Self {
        Self {
            stream_index,
            data,
            pts: None,
            dts: None,
            duration: 0,
            time_base,
            is_key: false,
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    pub fn with_key(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// 显示时间（秒），时间戳未知时为 None
    pub fn pts_seconds(&self) -> Option<f64> {
        self.pts.map(|ts| self.time_base.to_seconds(ts))
    }

    /// 解码时间（秒），时间戳未知时为 None
    pub fn dts_seconds(&self) -> Option<f64> {
        self.dts.map(|ts| self.time_base.to_seconds(ts))
    }
}

/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    RGBA,
    RGB24,
    YUV420P,
    NV12,
}

impl PixelFormat {
    /// 打包格式每像素字节数（平面格式返回 None）
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::RGBA => Some(4),
            PixelFormat::RGB24 => Some(3),
            PixelFormat::YUV420P | PixelFormat::NV12 => None,
        }
    }

    /// 每个平面紧密排列时的（每行字节数, 行数）
    pub fn planes(&self, width: u32, height: u32) -> Vec<(usize, usize)> {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        match self {
            PixelFormat::RGBA => vec![(w * 4, h)],
            PixelFormat::RGB24 => vec![(w * 3, h)],
            PixelFormat::YUV420P => vec![(w, h), (cw, ch), (cw, ch)],
            // UV 交错在第二个平面
            PixelFormat::NV12 => vec![(w, h), (cw * 2, ch)],
        }
    }

    /// 给定宽高时一帧紧密排列（对齐 1）的字节数
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self.bytes_per_pixel() {
            Some(bpp) => w * h * bpp,
            None => w * h + 2 * (w.div_ceil(2) * h.div_ceil(2)),
        }
    }
}

/// 音频采样格式（输出设备用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    /// 有符号 16 位小端，交错存放
    S16,
}

impl SampleFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::S16 => 2,
        }
    }
}

/// 音频设备输出格式（固定，不与设备协商）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    /// 设备缓冲区样本帧数（2 的幂）
    pub samples: u16,
}

impl AudioSpec {
    /// 一个样本帧（所有声道各一个样本）的字节数
    pub fn bytes_per_sample_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }
}

impl Default for AudioSpec {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            format: SampleFormat::S16,
            samples: 512,
        }
    }
}

/// 视频像素格式转换的输出参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSwsSpec {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub size: usize,
}

impl VideoSwsSpec {
    /// 输出宽高向下取整为 16 的倍数
    pub fn for_source(src_width: u32, src_height: u32, pixel_format: PixelFormat) -> Self {
        let width = src_width >> 4 << 4;
        let height = src_height >> 4 << 4;
        Self {
            width,
            height,
            pixel_format,
            size: pixel_format.buffer_size(width, height),
        }
    }
}

/// 交给渲染方的视频帧
///
/// 像素数据是独立拷贝，所有权随帧一起移交，管线自己的转换缓冲区永远不会外泄。
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub size: usize,
    /// 帧对应的视频时钟（秒）
    pub time: f64,
}

/// 播放状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        }
    }
}

/// 流信息（由解封装器给出）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub time_base: TimeBase,
    pub codec: String,
}

/// 媒体信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration: i64,          // 总时长（秒）
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}
