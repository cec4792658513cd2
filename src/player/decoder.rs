use crate::core::{AudioSpec, Packet, PixelFormat, PlayerError, Result, SampleFormat, VideoSwsSpec};
use crate::player::demuxer_source::{AudioDecoder, DecodedPicture, VideoDecoder};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{codec, format, software, util};
use log::{debug, warn};

/// 内部 Packet → FFmpeg Packet
fn to_av_packet(packet: &Packet) -> ffmpeg::Packet {
    let mut av_packet = ffmpeg::Packet::copy(&packet.data);
    av_packet.set_pts(packet.pts);
    av_packet.set_dts(packet.dts);
    av_packet.set_duration(packet.duration);
    if packet.is_key {
        av_packet.set_flags(ffmpeg::packet::Flags::KEY);
    }
    av_packet
}

fn to_av_pixel(format: PixelFormat) -> util::format::Pixel {
    match format {
        PixelFormat::RGBA => util::format::Pixel::RGBA,
        PixelFormat::RGB24 => util::format::Pixel::RGB24,
        PixelFormat::YUV420P => util::format::Pixel::YUV420P,
        PixelFormat::NV12 => util::format::Pixel::NV12,
    }
}

fn to_av_sample(format: SampleFormat) -> util::format::Sample {
    match format {
        SampleFormat::S16 => util::format::Sample::I16(util::format::sample::Type::Packed),
    }
}

/// 音频解码器（解码 + 重采样到设备固定格式）
pub struct FfmpegAudioDecoder {
    decoder: codec::decoder::Audio,
    resampler: Option<software::resampling::Context>,
    decoded: util::frame::Audio,
    resampled: util::frame::Audio,
    output: AudioSpec,
}

// SwrContext 本身不是 Send，但每个解码器实例只在音频回调线程里使用
unsafe impl Send for FfmpegAudioDecoder {}

impl FfmpegAudioDecoder {
    /// 从音频流创建解码器（指定目标配置）
    pub fn from_stream(stream: format::stream::Stream, output: AudioSpec) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;

        debug!(
            "音频解码器: {} Hz, {} 声道, 格式: {:?} → 目标: {} Hz, {} 声道",
            decoder.rate(),
            decoder.channels(),
            decoder.format(),
            output.sample_rate,
            output.channels
        );

        Ok(Self {
            decoder,
            resampler: None,
            decoded: util::frame::Audio::empty(),
            resampled: util::frame::Audio::empty(),
            output,
        })
    }

    fn target_layout(&self) -> util::channel_layout::ChannelLayout {
        match self.output.channels {
            1 => util::channel_layout::ChannelLayout::MONO,
            _ => util::channel_layout::ChannelLayout::STEREO,
        }
    }

    /// 第一次拿到帧时才初始化重采样器（有些解码器在第一帧之前给不出声道布局）
    fn ensure_resampler(&mut self) -> Result<()> {
        if self.resampler.is_some() {
            return Ok(());
        }

        let mut source_layout = self.decoded.channel_layout();
        if source_layout.is_empty() {
            source_layout = util::channel_layout::ChannelLayout::default(self.decoded.channels() as i32);
        }

        debug!(
            "🔧 初始化音频重采样器: {}Hz/{}ch → {}Hz/{}ch",
            self.decoded.rate(),
            self.decoded.channels(),
            self.output.sample_rate,
            self.output.channels
        );

        self.resampler = Some(software::resampling::Context::get(
            self.decoded.format(),
            source_layout,
            self.decoded.rate(),
            to_av_sample(self.output.format),
            self.target_layout(),
            self.output.sample_rate,
        )?);
        Ok(())
    }
}

impl AudioDecoder for FfmpegAudioDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        self.decoder.send_packet(&to_av_packet(packet))?;
        Ok(())
    }

    fn receive_resampled(&mut self, out: &mut [u8]) -> Result<usize> {
        // 一个音频包通常正好解出一帧，这里只拉一帧
        match self.decoder.receive_frame(&mut self.decoded) {
            Ok(()) => {}
            Err(ffmpeg::Error::Other { errno: 11 }) => return Ok(0), // EAGAIN
            Err(ffmpeg::Error::Eof) => return Ok(0),
            Err(e) => return Err(e.into()),
        }

        self.ensure_resampler()?;
        let resampler = self
            .resampler
            .as_mut()
            .ok_or_else(|| PlayerError::ConvertError("重采样器未初始化".to_string()))?;
        resampler.run(&self.decoded, &mut self.resampled)?;

        let bytes = self.resampled.samples() * self.output.bytes_per_sample_frame();
        let bytes = bytes.min(out.len());
        if bytes < self.resampled.samples() * self.output.bytes_per_sample_frame() {
            warn!("重采样输出超过缓冲区容量，截断到 {} 字节", bytes);
        }
        out[..bytes].copy_from_slice(&self.resampled.data(0)[..bytes]);
        Ok(bytes)
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}

/// 视频解码器（软件解码 + 像素格式转换）
pub struct FfmpegVideoDecoder {
    decoder: codec::decoder::Video,
    scaler: software::scaling::Context,
    decoded: util::frame::Video,
    /// 转换工作缓冲区，每一帧都会被覆盖
    converted: util::frame::Video,
    spec: VideoSwsSpec,
    time_base: f64,
}

// SwsContext 本身不是 Send，但我们确保只在视频线程中使用它
unsafe impl Send for FfmpegVideoDecoder {}

impl FfmpegVideoDecoder {
    /// 从视频流创建解码器
    pub fn from_stream(stream: format::stream::Stream, pixel_format: PixelFormat) -> Result<Self> {
        let context = codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().video()?;

        let time_base = stream.time_base();
        let time_base = time_base.numerator() as f64 / time_base.denominator() as f64;

        // 宽高 16 的倍数
        let spec = VideoSwsSpec::for_source(decoder.width(), decoder.height(), pixel_format);
        if spec.width == 0 || spec.height == 0 {
            return Err(PlayerError::ConvertError(format!(
                "视频尺寸过小: {}x{}",
                decoder.width(),
                decoder.height()
            )));
        }

        debug!(
            "软件解码器: {}x{}, 格式: {:?} → {}x{} {:?}",
            decoder.width(),
            decoder.height(),
            decoder.format(),
            spec.width,
            spec.height,
            spec.pixel_format
        );

        let scaler = software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            to_av_pixel(pixel_format),
            spec.width,
            spec.height,
            software::scaling::Flags::BILINEAR,
        )?;

        Ok(Self {
            decoder,
            scaler,
            decoded: util::frame::Video::empty(),
            converted: util::frame::Video::empty(),
            spec,
            time_base,
        })
    }

    /// 分辨率中途变化时重建 scaler，输出尺寸保持不变
    fn refresh_scaler(&mut self) -> Result<()> {
        let input = self.scaler.input();
        if input.format == self.decoded.format()
            && input.width == self.decoded.width()
            && input.height == self.decoded.height()
        {
            return Ok(());
        }
        debug!(
            "输入尺寸变化 {}x{} → {}x{}，重建 scaler",
            input.width,
            input.height,
            self.decoded.width(),
            self.decoded.height()
        );
        self.scaler = software::scaling::Context::get(
            self.decoded.format(),
            self.decoded.width(),
            self.decoded.height(),
            to_av_pixel(self.spec.pixel_format),
            self.spec.width,
            self.spec.height,
            software::scaling::Flags::BILINEAR,
        )?;
        Ok(())
    }
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        self.decoder.send_packet(&to_av_packet(packet))?;
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<DecodedPicture>> {
        match self.decoder.receive_frame(&mut self.decoded) {
            Ok(()) => Ok(Some(DecodedPicture {
                time: self.decoded.timestamp().map(|ts| ts as f64 * self.time_base),
            })),
            Err(ffmpeg::Error::Other { errno: 11 }) => Ok(None), // EAGAIN
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn convert_into(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.refresh_scaler()?;
        self.scaler.run(&self.decoded, &mut self.converted)?;

        // 逐平面复制到连续内存（去掉行对齐填充）
        out.resize(self.spec.size, 0);
        let mut dst_offset = 0;
        for (plane, (row_size, rows)) in self
            .spec
            .pixel_format
            .planes(self.spec.width, self.spec.height)
            .into_iter()
            .enumerate()
        {
            let stride = self.converted.stride(plane);
            let frame_data = self.converted.data(plane);
            for y in 0..rows {
                let src_offset = y * stride;
                let row = frame_data.get(src_offset..src_offset + row_size).ok_or_else(|| {
                    PlayerError::ConvertError(format!("平面 {} 第 {} 行超出缓冲区 (stride={})", plane, y, stride))
                })?;
                out[dst_offset..dst_offset + row_size].copy_from_slice(row);
                dst_offset += row_size;
            }
        }
        Ok(())
    }

    fn output_spec(&self) -> VideoSwsSpec {
        self.spec
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }
}
