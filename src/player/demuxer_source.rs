use crate::core::{AudioSpec, MediaInfo, Packet, PixelFormat, Result, StreamInfo, StreamKind, VideoSwsSpec};
use std::path::Path;

/// 读一个包的结果
#[derive(Debug)]
pub enum ReadOutcome {
    /// 读到一个属于某条流的包（是否是被跟踪的流由读线程判断）
    Packet(Packet),
    /// 读到文件尾
    Eof,
}

/// 媒体后端：按路径打开容器
///
/// 播放器每次从停止状态开始播放都会重新打开一次。
pub trait MediaBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn DemuxerSource>>;
}

/// Demuxer 数据源抽象接口
///
/// 不同的实现（FFmpeg、测试用的内存数据源）都实现这个接口，
/// 由读线程独占使用。
pub trait DemuxerSource: Send {
    /// 找指定类型的最佳流
    fn best_stream(&self, kind: StreamKind) -> Option<StreamInfo>;

    /// 为音频流创建解码器（内含重采样到 `output` 格式）
    fn open_audio_decoder(&self, stream: &StreamInfo, output: &AudioSpec) -> Result<Box<dyn AudioDecoder>>;

    /// 为视频流创建解码器（内含像素格式转换到 `pixel_format`）
    fn open_video_decoder(&self, stream: &StreamInfo, pixel_format: PixelFormat) -> Result<Box<dyn VideoDecoder>>;

    /// 读取下一个包
    ///
    /// 返回：
    /// - Ok(ReadOutcome::Packet): 成功读取一个包
    /// - Ok(ReadOutcome::Eof): 到达文件末尾
    /// - Err(e): 读取错误（单个包的错误，读线程会跳过继续）
    fn read_packet(&mut self) -> Result<ReadOutcome>;

    /// 在 `stream_index` 上 seek 到 `timestamp`（该流时间基），向前找最近的关键帧
    fn seek(&mut self, stream_index: usize, timestamp: i64) -> Result<()>;

    /// 容器总时长（秒）
    fn duration_seconds(&self) -> i64;

    /// 获取媒体信息
    fn media_info(&self) -> MediaInfo;

    /// 获取描述信息（用于调试）
    fn description(&self) -> String;
}

/// 音频解码 + 重采样
pub trait AudioDecoder: Send {
    /// 送一个编码包进解码器
    fn send_packet(&mut self, packet: &Packet) -> Result<()>;

    /// 拉取一帧解码数据，重采样成输出格式写进 `out`
    ///
    /// 返回写入的字节数；解码器暂时没有输出时返回 Ok(0)。
    fn receive_resampled(&mut self, out: &mut [u8]) -> Result<usize>;

    /// 丢弃解码器内部缓存（seek 之后）
    fn flush(&mut self);
}

/// 解码出的一帧（数据留在解码器内部，等待转换）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedPicture {
    /// 帧自身的时间（秒），解码器给不出时为 None
    pub time: Option<f64>,
}

/// 视频解码 + 像素格式转换
pub trait VideoDecoder: Send {
    fn send_packet(&mut self, packet: &Packet) -> Result<()>;

    /// 取出一帧已解码的画面；没有更多帧时返回 Ok(None)
    fn receive_frame(&mut self) -> Result<Option<DecodedPicture>>;

    /// 把最近一次 `receive_frame` 得到的画面转换后写进 `out`（紧密排列）
    fn convert_into(&mut self, out: &mut Vec<u8>) -> Result<()>;

    /// 转换输出参数（宽高已向下取整到 16 的倍数）
    fn output_spec(&self) -> VideoSwsSpec;

    fn flush(&mut self);
}
