use crate::core::{PlaybackState, PlayerError, Result, StreamInfo, StreamKind};
use crate::player::audio_output::AudioDevice;
use crate::player::audio_pipeline::AudioPipeline;
use crate::player::demuxer_source::{DemuxerSource, MediaBackend, ReadOutcome, VideoDecoder};
use crate::player::events::PlayerEvent;
use crate::player::free_gate::Subsystem;
use crate::player::session::SessionShared;
use crate::player::video_pipeline::VideoPipeline;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 读线程退出时的回调（自然播完或初始化失败时由控制器执行停止流程）
pub type FinishHook = Box<dyn FnOnce() + Send>;

/// 读线程按流分发的计数
#[derive(Debug, Default, Clone, Copy)]
struct ReadStats {
    audio: u64,
    video: u64,
    discarded: u64,
    read_errors: u64,
    seeks: u64,
}

/// 初始化成功后读线程持有的东西
struct OpenedSession {
    demuxer: Box<dyn DemuxerSource>,
    audio: Option<(StreamInfo, Arc<AudioPipeline>)>,
    video: Option<StreamInfo>,
}

/// 读线程（解封装 + seek 执行）
///
/// 每次从 Stopped 开始播放时启动一次：打开容器、建立音视频管线，
/// 然后循环读包分发到两个队列，直到状态变成 Stopped 或者文件读完且队列排空。
pub struct Reader {
    shared: Arc<SessionShared>,
    backend: Arc<dyn MediaBackend>,
    device: Arc<Mutex<Box<dyn AudioDevice>>>,
    path: PathBuf,
    on_finish: Option<FinishHook>,
}

impl Reader {
    pub fn new(
        shared: Arc<SessionShared>,
        backend: Arc<dyn MediaBackend>,
        device: Arc<Mutex<Box<dyn AudioDevice>>>,
        path: PathBuf,
        on_finish: FinishHook,
    ) -> Self {
        Self {
            shared,
            backend,
            device,
            path,
            on_finish: Some(on_finish),
        }
    }

    pub fn run(mut self) {
        info!("{} 🎬 读线程启动: {}", log_ctx(), self.path.display());

        let shared = self.shared.clone();
        let finished = {
            // 读线程中途 panic 也要放行停止流程
            let _freeable = shared.gate.guard(Subsystem::Container);
            match self.setup() {
                Ok(Some(opened)) => {
                    let natural_end = self.read_loop(opened);
                    if natural_end {
                        info!("{} ✅ 播放结束", log_ctx());
                    }
                    natural_end
                }
                Ok(None) => {
                    info!("{} ⏹ 初始化期间已停止", log_ctx());
                    false
                }
                Err(e) => {
                    error!("{} ❌ 播放失败: {}", log_ctx(), e);
                    shared.emit(PlayerEvent::PlayFailed);
                    shared.emit(PlayerEvent::StateChanged(PlaybackState::Stopped));
                    true
                }
            }
        };
        // 容器已可释放之后才能走停止流程，停止流程会等它
        if finished {
            self.finish();
        }
    }

    fn finish(&mut self) {
        if let Some(on_finish) = self.on_finish.take() {
            on_finish();
        }
    }

    /// 打开容器、解码器、音频设备
    ///
    /// 返回 Ok(None) 表示初始化期间会话已经被停止。
    fn setup(&mut self) -> Result<Option<OpenedSession>> {
        let demuxer = self.backend.open(&self.path)?;
        let info = demuxer.media_info();
        info!(
            "{} 📊 {}: 时长 {}s, 视频 {} {}x{}, 音频 {} {}Hz/{}ch",
            log_ctx(),
            demuxer.description(),
            info.duration,
            info.video_codec,
            info.width,
            info.height,
            info.audio_codec,
            info.sample_rate,
            info.channels
        );
        let duration = demuxer.duration_seconds();
        self.shared.set_duration(duration);

        let audio = match demuxer.best_stream(StreamKind::Audio) {
            Some(stream) => match self.open_audio(&*demuxer, &stream) {
                Ok(pipeline) => Some((stream, pipeline)),
                Err(e) => {
                    warn!("{} ⚠️  音频流 #{} 不可用: {}", log_ctx(), stream.index, e);
                    None
                }
            },
            None => None,
        };

        let video = match demuxer.best_stream(StreamKind::Video) {
            Some(stream) => match demuxer.open_video_decoder(&stream, self.shared.config.video_pixel_format) {
                Ok(decoder) => Some((stream, decoder)),
                Err(e) => {
                    warn!("{} ⚠️  视频流 #{} 不可用: {}", log_ctx(), stream.index, e);
                    None
                }
            },
            None => None,
        };

        if audio.is_none() && video.is_none() {
            return Err(PlayerError::NoPlayableStream);
        }

        if !self.shared.begin_playing() {
            // 设备还没恢复过，回调不会再跑
            if audio.is_some() {
                self.shared.gate.mark_freeable(Subsystem::Audio);
            }
            return Ok(None);
        }
        self.shared.emit(PlayerEvent::InitFinished { duration });

        let audio = match audio {
            Some(opened) => {
                let resumed = self.device.lock().set_paused(false);
                match resumed {
                    Ok(()) => Some(opened),
                    Err(e) => {
                        // 设备不会来拉数据，按没有音频继续播放
                        warn!("{} ⚠️  恢复音频设备失败，放弃音频: {}", log_ctx(), e);
                        self.drop_audio();
                        None
                    }
                }
            }
            None => None,
        };

        let video = match video {
            Some((stream, decoder)) => match self.spawn_video(decoder) {
                Ok(()) => Some(stream),
                Err(e) => {
                    error!("{} ❌ 视频线程启动失败: {}", log_ctx(), e);
                    None
                }
            },
            None => None,
        };

        Ok(Some(OpenedSession { demuxer, audio, video }))
    }

    fn open_audio(&self, demuxer: &dyn DemuxerSource, stream: &StreamInfo) -> Result<Arc<AudioPipeline>> {
        let spec = self.shared.config.audio_output;
        let decoder = demuxer.open_audio_decoder(stream, &spec)?;
        let pipeline = Arc::new(AudioPipeline::new(self.shared.clone(), decoder));
        self.device.lock().open(&spec, pipeline.clone())?;
        self.shared.gate.arm(Subsystem::Audio);
        self.shared.set_has_audio(true);
        info!(
            "{} 🔊 音频流 #{} ({}) → {}Hz/{}ch",
            log_ctx(),
            stream.index,
            stream.codec,
            spec.sample_rate,
            spec.channels
        );
        Ok(pipeline)
    }

    /// 关掉音频设备并不再向音频队列分发
    fn drop_audio(&self) {
        self.device.lock().close();
        self.shared.set_has_audio(false);
        self.shared.gate.mark_freeable(Subsystem::Audio);
        self.shared.clock_changed.notify();
    }

    fn spawn_video(&self, decoder: Box<dyn VideoDecoder>) -> Result<()> {
        let pipeline = VideoPipeline::new(self.shared.clone(), decoder);
        self.shared.gate.arm(Subsystem::Video);
        let spawned = thread::Builder::new()
            .name("video-pipeline".to_string())
            .spawn(move || pipeline.run());
        match spawned {
            Ok(handle) => {
                self.shared.set_has_video(true);
                self.shared.set_video_thread(handle);
                Ok(())
            }
            Err(e) => {
                // 线程没起来，没有人会碰视频资源
                self.shared.gate.mark_freeable(Subsystem::Video);
                Err(e.into())
            }
        }
    }

    /// 读包循环，返回是否是自然播完
    fn read_loop(&self, opened: OpenedSession) -> bool {
        let OpenedSession {
            mut demuxer,
            audio,
            video,
        } = opened;
        let audio_index = audio.as_ref().map(|(stream, _)| stream.index);
        let video_index = video.as_ref().map(|stream| stream.index);
        // seek 以音频流为准，没有音频时用视频流
        let lead = audio.as_ref().map(|(stream, _)| stream.clone()).or_else(|| video.clone());

        let shared = &self.shared;
        let backoff = shared.config.backpressure_backoff();
        let mut stats = ReadStats::default();
        let mut eof = false;
        let mut natural_end = false;

        while !shared.is_stopped() {
            if let Some(target) = shared.clock.take_pending_seek() {
                if let Some(lead) = lead.as_ref() {
                    if self.execute_seek(&mut *demuxer, lead, target) {
                        stats.seeks += 1;
                        eof = false;
                    }
                }
            }

            // 背压：任一队列满了就不再读，等消费者取走
            if shared.audio_queue.is_full() {
                shared.audio_queue.wait_not_full(backoff);
                continue;
            }
            if shared.video_queue.is_full() {
                shared.video_queue.wait_not_full(backoff);
                continue;
            }

            if eof {
                // 文件读完后继续等队列里已有的包被消费完
                if shared.audio_queue.is_empty() && shared.video_queue.is_empty() {
                    natural_end = true;
                    break;
                }
                shared.state_changed.wait_until_timeout(backoff, backoff, || {
                    shared.is_stopped() || shared.clock.pending_seek().is_some()
                });
                continue;
            }

            match demuxer.read_packet() {
                Ok(ReadOutcome::Packet(packet)) => {
                    let index = Some(packet.stream_index);
                    if index == audio_index {
                        stats.audio += 1;
                        shared.audio_queue.push(packet);
                    } else if index == video_index {
                        stats.video += 1;
                        shared.video_queue.push(packet);
                    } else {
                        stats.discarded += 1;
                    }
                }
                Ok(ReadOutcome::Eof) => {
                    info!(
                        "{} 📭 读到文件尾，等待队列排空 (音频 {}, 视频 {})",
                        log_ctx(),
                        shared.audio_queue.len(),
                        shared.video_queue.len()
                    );
                    eof = true;
                }
                Err(e) => {
                    stats.read_errors += 1;
                    warn!("{} ⚠️  读包失败（跳过）: {}", log_ctx(), e);
                }
            }
        }

        drop(demuxer);
        drop(audio);
        info!(
            "{} 🛑 读线程退出: 音频 {} 包, 视频 {} 包, 丢弃 {} 包, 读错误 {}, seek {} 次",
            log_ctx(),
            stats.audio,
            stats.video,
            stats.discarded,
            stats.read_errors,
            stats.seeks
        );
        natural_end
    }

    /// 执行一次 seek；失败时目标已被取走，相当于什么都没发生
    fn execute_seek(&self, demuxer: &mut dyn DemuxerSource, lead: &StreamInfo, target: i64) -> bool {
        let timestamp = lead.time_base.from_seconds(target as f64);
        info!(
            "{} ⏩ Seek 到 {}s (流 #{} ts={})",
            log_ctx(),
            target,
            lead.index,
            timestamp
        );

        if let Err(e) = demuxer.seek(lead.index, timestamp) {
            warn!("{} ⚠️  {}", log_ctx(), e);
            return false;
        }

        // 先清队列再归零时钟，旧包不会再覆盖时钟
        let audio = self.shared.audio_queue.clear();
        let video = self.shared.video_queue.clear();
        self.shared.clock.complete_seek(target);
        self.shared.wake_all();
        debug!("{} 🧹 Seek 完成，清空音频 {} 包、视频 {} 包", log_ctx(), audio, video);
        true
    }
}
