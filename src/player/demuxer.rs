use crate::core::{
    AudioSpec, MediaInfo, Packet, PixelFormat, PlayerError, Result, StreamInfo, StreamKind, TimeBase,
};
use crate::player::decoder::{FfmpegAudioDecoder, FfmpegVideoDecoder};
use crate::player::demuxer_source::{AudioDecoder, DemuxerSource, MediaBackend, ReadOutcome, VideoDecoder};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};
use std::path::Path;

/// FFmpeg 后端
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Result<Self> {
        ffmpeg::init()?;
        Ok(Self)
    }
}

impl MediaBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn DemuxerSource>> {
        Ok(Box::new(FfmpegDemuxer::open(path)?))
    }
}

/// 解封装器 - 负责读取媒体文件并分离音视频流
pub struct FfmpegDemuxer {
    input_ctx: format::context::Input,
    source_path: String, // 媒体源路径（用于描述）
}

impl FfmpegDemuxer {
    /// 打开媒体文件（同时探测流信息）
    pub fn open(path: &Path) -> Result<Self> {
        info!("正在打开文件: {}", path.display());

        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件 {}: {}", path.display(), e)))?;

        let demuxer = Self {
            input_ctx,
            source_path: path.display().to_string(),
        };

        for stream in demuxer.input_ctx.streams() {
            let params = stream.parameters();
            debug!(
                "流 #{}: {:?} {} time_base={:?}",
                stream.index(),
                params.medium(),
                params.id().name(),
                stream.time_base()
            );
        }

        Ok(demuxer)
    }

    fn stream_info(&self, kind: StreamKind) -> Option<StreamInfo> {
        let medium = match kind {
            StreamKind::Audio => media::Type::Audio,
            StreamKind::Video => media::Type::Video,
        };
        let stream = self.input_ctx.streams().best(medium)?;
        let tb = stream.time_base();
        Some(StreamInfo {
            index: stream.index(),
            kind,
            time_base: TimeBase::new(tb.numerator(), tb.denominator()),
            codec: stream.parameters().id().name().to_string(),
        })
    }

    fn time_base_of(&self, stream_index: usize) -> TimeBase {
        self.input_ctx
            .stream(stream_index)
            .map(|s| {
                let tb = s.time_base();
                TimeBase::new(tb.numerator(), tb.denominator())
            })
            .unwrap_or(TimeBase::new(0, 1))
    }
}

impl DemuxerSource for FfmpegDemuxer {
    fn best_stream(&self, kind: StreamKind) -> Option<StreamInfo> {
        self.stream_info(kind)
    }

    fn open_audio_decoder(&self, stream: &StreamInfo, output: &AudioSpec) -> Result<Box<dyn AudioDecoder>> {
        let av_stream = self
            .input_ctx
            .stream(stream.index)
            .ok_or(PlayerError::StreamNotFound(StreamKind::Audio))?;
        Ok(Box::new(FfmpegAudioDecoder::from_stream(av_stream, *output)?))
    }

    fn open_video_decoder(&self, stream: &StreamInfo, pixel_format: PixelFormat) -> Result<Box<dyn VideoDecoder>> {
        let av_stream = self
            .input_ctx
            .stream(stream.index)
            .ok_or(PlayerError::StreamNotFound(StreamKind::Video))?;
        Ok(Box::new(FfmpegVideoDecoder::from_stream(av_stream, pixel_format)?))
    }

    fn read_packet(&mut self) -> Result<ReadOutcome> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input_ctx) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Ok(ReadOutcome::Eof),
            Err(e) => return Err(e.into()),
        }

        // 字幕/数据流也原样交给读线程，由它按流序号丢弃
        let stream_index = packet.stream();
        let mut out = Packet::new(
            stream_index,
            packet.data().map(|d| d.to_vec()).unwrap_or_default(),
            self.time_base_of(stream_index),
        )
        .with_key(packet.is_key());
        out.pts = packet.pts();
        out.dts = packet.dts();
        out.duration = packet.duration();
        Ok(ReadOutcome::Packet(out))
    }

    fn seek(&mut self, stream_index: usize, timestamp: i64) -> Result<()> {
        // ffmpeg-next 只封装了 avformat_seek_file（全局时间基），这里要按单条流的时间基向后 seek
        let ret = unsafe {
            ffmpeg::ffi::av_seek_frame(
                self.input_ctx.as_mut_ptr(),
                stream_index as i32,
                timestamp,
                ffmpeg::ffi::AVSEEK_FLAG_BACKWARD as i32,
            )
        };
        if ret < 0 {
            return Err(PlayerError::SeekError(format!(
                "stream #{} ts={}: {}",
                stream_index,
                timestamp,
                ffmpeg::Error::from(ret)
            )));
        }
        Ok(())
    }

    fn duration_seconds(&self) -> i64 {
        let duration = self.input_ctx.duration();
        if duration <= 0 {
            return 0;
        }
        duration / i64::from(ffmpeg::ffi::AV_TIME_BASE)
    }

    fn media_info(&self) -> MediaInfo {
        let mut info = MediaInfo {
            duration: self.duration_seconds(),
            ..MediaInfo::default()
        };

        if let Some(stream) = self.input_ctx.streams().best(media::Type::Video) {
            info.video_codec = stream.parameters().id().name().to_string();
            if let Ok(decoder) = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .and_then(|ctx| ctx.decoder().video())
            {
                info.width = decoder.width();
                info.height = decoder.height();
            }
        } else {
            info.video_codec = "none".to_string();
        }

        if let Some(stream) = self.input_ctx.streams().best(media::Type::Audio) {
            info.audio_codec = stream.parameters().id().name().to_string();
            if let Ok(decoder) = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .and_then(|ctx| ctx.decoder().audio())
            {
                info.sample_rate = decoder.rate();
                info.channels = decoder.channels();
            }
        } else {
            info.audio_codec = "none".to_string();
        }

        info
    }

    fn description(&self) -> String {
        format!("FFmpeg Demuxer: {}", self.source_path)
    }
}
