use crate::core::{AudioSpec, Result};
use std::sync::Arc;

/// 混音最大音量（与 SDL_MIX_MAXVOLUME 相同）
pub const MIX_MAX_VOLUME: i32 = 128;

/// 拉取式音频数据源
///
/// 设备需要数据时在自己的实时线程里调用 `fill`，实现方不能无限期阻塞。
pub trait AudioSink: Send + Sync {
    /// 填充 `out`（S16LE 交错）；填不满的部分保持静音
    fn fill(&self, out: &mut [u8]);
}

/// 音频输出设备
pub trait AudioDevice: Send {
    /// 以固定格式打开设备，打开后处于暂停状态
    fn open(&mut self, spec: &AudioSpec, sink: Arc<dyn AudioSink>) -> Result<()>;

    /// 暂停/恢复拉取回调
    fn set_paused(&mut self, paused: bool) -> Result<()>;

    /// 关闭设备；返回后不会再调用 sink
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// 音量 0..=100 → 混音音量 0..=MIX_MAX_VOLUME，静音时为 0
pub fn mix_volume(volume: u8, muted: bool) -> i32 {
    if muted {
        return 0;
    }
    (volume.min(100) as f64 / 100.0 * MIX_MAX_VOLUME as f64) as i32
}

/// 把 `src` 按音量叠加进 `dst`（S16LE），结果饱和截断
///
/// 叠加而不是覆盖：同一次回调里多次填充可以依次拼接。音量为 0 时什么都不做。
pub fn mix_audio_s16(dst: &mut [u8], src: &[u8], volume: i32) {
    if volume <= 0 {
        return;
    }
    let volume = volume.min(MIX_MAX_VOLUME);
    for (d, s) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        let src_sample = i16::from_le_bytes([s[0], s[1]]) as i32;
        let dst_sample = i16::from_le_bytes([d[0], d[1]]) as i32;
        let mixed = dst_sample + src_sample * volume / MIX_MAX_VOLUME;
        let mixed = mixed.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        d.copy_from_slice(&mixed.to_le_bytes());
    }
}

#[cfg(feature = "audio-device")]
pub use cpal_device::CpalAudioDevice;

#[cfg(feature = "audio-device")]
mod cpal_device {
    use super::{AudioDevice, AudioSink};
    use crate::core::{AudioSpec, PlayerError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, FromSample, Sample, SizedSample, StreamConfig, SupportedStreamConfigRange};
    use crossbeam_channel::{bounded, unbounded, Sender};
    use log::{debug, error, info, warn};
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};

    enum DeviceCommand {
        Pause(bool),
        Close,
    }

    /// 音频输出 - 使用 cpal 播放音频
    ///
    /// cpal::Stream 不是 Send，所以流在一个专门的线程里创建并持有，
    /// 暂停/关闭通过通道转发过去。
    pub struct CpalAudioDevice {
        command_tx: Option<Sender<DeviceCommand>>,
        owner: Option<JoinHandle<()>>,
    }

    impl CpalAudioDevice {
        pub fn new() -> Self {
            Self {
                command_tx: None,
                owner: None,
            }
        }

        /// 检查配置是否兼容
        fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
            let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
                && config.sample_rate.0 <= supported.max_sample_rate().0;

            let channels_match = config.channels == supported.channels();

            rate_in_range && channels_match
        }

        /// 优先 I16，其次 F32
        fn pick_sample_format(device: &Device, config: &StreamConfig) -> Result<cpal::SampleFormat> {
            let supported: Vec<_> = device
                .supported_output_configs()
                .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?
                .filter(|range| Self::is_config_compatible(config, range))
                .map(|range| range.sample_format())
                .collect();

            [cpal::SampleFormat::I16, cpal::SampleFormat::F32]
                .into_iter()
                .find(|format| supported.contains(format))
                .ok_or_else(|| {
                    PlayerError::AudioError(format!(
                        "音频设备不支持 {} Hz, {} 声道",
                        config.sample_rate.0, config.channels
                    ))
                })
        }

        fn build_stream<T>(device: &Device, config: &StreamConfig, sink: Arc<dyn AudioSink>) -> Result<cpal::Stream>
        where
            T: SizedSample + FromSample<i16>,
        {
            // 回调里复用的 S16 字节缓冲区
            let mut scratch: Vec<u8> = Vec::new();
            device
                .build_output_stream(
                    config,
                    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                        scratch.clear();
                        scratch.resize(data.len() * 2, 0);
                        sink.fill(&mut scratch);
                        for (sample, bytes) in data.iter_mut().zip(scratch.chunks_exact(2)) {
                            *sample = T::from_sample(i16::from_le_bytes([bytes[0], bytes[1]]));
                        }
                    },
                    move |err| {
                        error!("音频流错误: {}", err);
                    },
                    None,
                )
                .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))
        }

        fn open_stream(spec: &AudioSpec, sink: Arc<dyn AudioSink>) -> Result<cpal::Stream> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

            debug!("使用音频设备: {}", device.name().unwrap_or_default());

            let config = StreamConfig {
                channels: spec.channels,
                sample_rate: cpal::SampleRate(spec.sample_rate),
                buffer_size: cpal::BufferSize::Fixed(spec.samples as u32),
            };

            let stream = match Self::pick_sample_format(&device, &config)? {
                cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, sink.clone()),
                _ => Self::build_stream::<f32>(&device, &config, sink.clone()),
            };
            match stream {
                Ok(stream) => Ok(stream),
                Err(e) => {
                    // 部分后端不接受固定缓冲区大小，退回默认值再试一次
                    warn!("⚠️  {}，改用默认缓冲区大小重试", e);
                    let config = StreamConfig {
                        buffer_size: cpal::BufferSize::Default,
                        ..config
                    };
                    match Self::pick_sample_format(&device, &config)? {
                        cpal::SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, sink),
                        _ => Self::build_stream::<f32>(&device, &config, sink),
                    }
                }
            }
        }
    }

    impl Default for CpalAudioDevice {
        fn default() -> Self {
            Self::new()
        }
    }

    impl AudioDevice for CpalAudioDevice {
        fn open(&mut self, spec: &AudioSpec, sink: Arc<dyn AudioSink>) -> Result<()> {
            if self.is_open() {
                self.close();
            }
            info!("初始化音频输出: {} Hz, {} 声道", spec.sample_rate, spec.channels);

            let spec = *spec;
            let (command_tx, command_rx) = unbounded::<DeviceCommand>();
            let (ready_tx, ready_rx) = bounded::<Result<()>>(1);

            let owner = thread::Builder::new()
                .name("audio-device".to_string())
                .spawn(move || {
                    let stream = match Self::open_stream(&spec, sink) {
                        Ok(stream) => {
                            // 打开后先暂停，等读线程初始化完毕再恢复
                            let _ = stream.pause();
                            let _ = ready_tx.send(Ok(()));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    for command in command_rx.iter() {
                        match command {
                            DeviceCommand::Pause(true) => {
                                if let Err(e) = stream.pause() {
                                    warn!("暂停音频流失败: {}", e);
                                }
                            }
                            DeviceCommand::Pause(false) => {
                                if let Err(e) = stream.play() {
                                    warn!("启动音频流失败: {}", e);
                                }
                            }
                            DeviceCommand::Close => break,
                        }
                    }
                    drop(stream);
                    info!("音频输出已停止");
                })?;

            let opened = ready_rx
                .recv()
                .map_err(|_| PlayerError::AudioError("音频线程意外退出".to_string()))?;
            if let Err(e) = opened {
                let _ = owner.join();
                return Err(e);
            }

            self.command_tx = Some(command_tx);
            self.owner = Some(owner);
            Ok(())
        }

        fn set_paused(&mut self, paused: bool) -> Result<()> {
            let tx = self
                .command_tx
                .as_ref()
                .ok_or_else(|| PlayerError::AudioError("音频设备未打开".to_string()))?;
            tx.send(DeviceCommand::Pause(paused))
                .map_err(|_| PlayerError::AudioError("音频线程已退出".to_string()))
        }

        fn close(&mut self) {
            if let Some(tx) = self.command_tx.take() {
                let _ = tx.send(DeviceCommand::Close);
            }
            // join 之后流已经 drop，回调不会再被调用
            if let Some(owner) = self.owner.take() {
                let _ = owner.join();
            }
        }

        fn is_open(&self) -> bool {
            self.command_tx.is_some()
        }
    }

    impl Drop for CpalAudioDevice {
        fn drop(&mut self) {
            self.close();
        }
    }
}
