//! 播放控制器端到端场景
//!
//! 用内存里的脚本化数据源（每个音频包解出的采样值 = 包时间 * 100 + 1）
//! 和一个自带拉取线程的假音频设备驱动完整的读线程/音频回调/视频线程。
//!
//! ```bash
//! cargo test --no-default-features --test playback_scenarios
//! ```

use crossbeam_channel::Receiver;
use myy_playback_core::core::{
    AudioSpec, MediaInfo, Packet, PixelFormat, PlaybackState, PlayerConfig, PlayerError, Result, StreamInfo,
    StreamKind, TimeBase, VideoSwsSpec,
};
use myy_playback_core::player::{
    AudioDecoder, AudioDevice, AudioSink, DecodedPicture, DemuxerSource, MediaBackend, PlayerController,
    PlayerEvent, ReadOutcome, VideoDecoder,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const AUDIO_INDEX: usize = 1;
const VIDEO_INDEX: usize = 0;
const MS: TimeBase = TimeBase::new(1, 1000);
const AUDIO_STEP_MS: i64 = 100;
const VIDEO_STEP_MS: i64 = 40;
const AUDIO_BYTES_PER_PACKET: usize = 1024;

// ---------- 脚本化数据源 ----------

#[derive(Clone)]
struct MediaScript {
    duration: i64,
    has_audio: bool,
    has_video: bool,
    fail_open: bool,
    open_delay: Duration,
    /// 读到第 n 个包时返回一次读错误
    read_error_at: Option<usize>,
    /// 视频像素转换时越界 panic
    convert_panics: bool,
}

impl MediaScript {
    fn av(duration: i64) -> Self {
        Self {
            duration,
            has_audio: true,
            has_video: true,
            fail_open: false,
            open_delay: Duration::ZERO,
            read_error_at: None,
            convert_panics: false,
        }
    }

    fn packets(&self) -> Vec<Packet> {
        let end = self.duration * 1000;
        let mut packets = Vec::new();
        if self.has_audio {
            packets.extend((0..end).step_by(AUDIO_STEP_MS as usize).map(|ms| {
                Packet::new(AUDIO_INDEX, vec![1], MS)
                    .with_pts(ms)
                    .with_dts(ms)
                    .with_key(true)
            }));
        }
        if self.has_video {
            packets.extend((0..end).step_by(VIDEO_STEP_MS as usize).map(|ms| {
                Packet::new(VIDEO_INDEX, vec![2], MS)
                    .with_pts(ms)
                    .with_dts(ms)
                    .with_key(ms % 1000 == 0)
            }));
        }
        // 一条不被跟踪的数据流
        packets.push(Packet::new(7, vec![0], MS).with_pts(0));
        packets.sort_by_key(|p| p.pts.unwrap_or(0));
        packets
    }
}

struct ScriptedBackend {
    script: MediaScript,
    opens: AtomicUsize,
    seeks: Arc<Mutex<Vec<(usize, i64)>>>,
}

impl ScriptedBackend {
    fn new(script: MediaScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            opens: AtomicUsize::new(0),
            seeks: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

impl MediaBackend for ScriptedBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn DemuxerSource>> {
        thread::sleep(self.script.open_delay);
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_open {
            return Err(PlayerError::OpenError(path.display().to_string()));
        }
        Ok(Box::new(ScriptedDemuxer {
            script: self.script.clone(),
            packets: self.script.packets(),
            cursor: 0,
            reads: 0,
            seeks: self.seeks.clone(),
        }))
    }
}

struct ScriptedDemuxer {
    script: MediaScript,
    packets: Vec<Packet>,
    cursor: usize,
    reads: usize,
    seeks: Arc<Mutex<Vec<(usize, i64)>>>,
}

impl DemuxerSource for ScriptedDemuxer {
    fn best_stream(&self, kind: StreamKind) -> Option<StreamInfo> {
        let (present, index) = match kind {
            StreamKind::Audio => (self.script.has_audio, AUDIO_INDEX),
            StreamKind::Video => (self.script.has_video, VIDEO_INDEX),
        };
        present.then(|| StreamInfo {
            index,
            kind,
            time_base: MS,
            codec: "scripted".to_string(),
        })
    }

    fn open_audio_decoder(&self, _stream: &StreamInfo, output: &AudioSpec) -> Result<Box<dyn AudioDecoder>> {
        assert_eq!(output.sample_rate, 44100);
        assert_eq!(output.channels, 2);
        Ok(Box::new(ScriptedAudioDecoder { pending: None }))
    }

    fn open_video_decoder(&self, _stream: &StreamInfo, pixel_format: PixelFormat) -> Result<Box<dyn VideoDecoder>> {
        Ok(Box::new(ScriptedVideoDecoder {
            ready: None,
            spec: VideoSwsSpec::for_source(70, 50, pixel_format),
            convert_panics: self.script.convert_panics,
        }))
    }

    fn read_packet(&mut self) -> Result<ReadOutcome> {
        self.reads += 1;
        if self.script.read_error_at == Some(self.reads) {
            return Err(PlayerError::DecodeError("scripted read error".to_string()));
        }
        match self.packets.get(self.cursor) {
            Some(packet) => {
                self.cursor += 1;
                Ok(ReadOutcome::Packet(packet.clone()))
            }
            None => Ok(ReadOutcome::Eof),
        }
    }

    fn seek(&mut self, stream_index: usize, timestamp: i64) -> Result<()> {
        self.seeks.lock().push((stream_index, timestamp));
        if timestamp >= self.script.duration * 1000 {
            return Err(PlayerError::SeekError("beyond end".to_string()));
        }
        // 向前落到目标前一秒的关键帧，制造一段需要丢弃的数据
        let keyframe = (timestamp / 1000 - 1).max(0) * 1000;
        self.cursor = self
            .packets
            .iter()
            .position(|p| p.pts.unwrap_or(0) >= keyframe)
            .unwrap_or(self.packets.len());
        Ok(())
    }

    fn duration_seconds(&self) -> i64 {
        self.script.duration
    }

    fn media_info(&self) -> MediaInfo {
        MediaInfo {
            duration: self.script.duration,
            ..MediaInfo::default()
        }
    }

    fn description(&self) -> String {
        "scripted".to_string()
    }
}

/// 解出的每个采样值都是 包时间 * 100 + 1
struct ScriptedAudioDecoder {
    pending: Option<i16>,
}

impl AudioDecoder for ScriptedAudioDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let seconds = packet.dts_seconds().unwrap_or(0.0);
        self.pending = Some((seconds * 100.0).round() as i16 + 1);
        Ok(())
    }

    fn receive_resampled(&mut self, out: &mut [u8]) -> Result<usize> {
        let Some(value) = self.pending.take() else {
            return Ok(0);
        };
        let bytes = AUDIO_BYTES_PER_PACKET.min(out.len());
        for sample in out[..bytes].chunks_exact_mut(2) {
            sample.copy_from_slice(&value.to_le_bytes());
        }
        Ok(bytes)
    }

    fn flush(&mut self) {
        self.pending = None;
    }
}

struct ScriptedVideoDecoder {
    ready: Option<f64>,
    spec: VideoSwsSpec,
    convert_panics: bool,
}

impl VideoDecoder for ScriptedVideoDecoder {
    fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        self.ready = packet.pts_seconds();
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Option<DecodedPicture>> {
        Ok(self.ready.take().map(|time| DecodedPicture { time: Some(time) }))
    }

    fn convert_into(&mut self, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        if self.convert_panics {
            // 按打包格式去读一个只有一行的平面
            let plane = vec![0u8; self.spec.width as usize];
            out.extend_from_slice(&plane[..self.spec.size]);
        }
        out.resize(self.spec.size, 0x80);
        Ok(())
    }

    fn output_spec(&self) -> VideoSwsSpec {
        self.spec
    }

    fn flush(&mut self) {
        self.ready = None;
    }
}

// ---------- 假音频设备：自己的线程定时拉取 ----------

#[derive(Default)]
struct DeviceRecord {
    /// 设备收到的所有非零采样
    samples: Mutex<Vec<i16>>,
    bytes_pulled: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

struct PullThreadDevice {
    record: Arc<DeviceRecord>,
    paused: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    puller: Option<JoinHandle<()>>,
}

impl PullThreadDevice {
    fn new(record: Arc<DeviceRecord>) -> Self {
        Self {
            record,
            paused: Arc::new(AtomicBool::new(true)),
            closed: Arc::new(AtomicBool::new(false)),
            puller: None,
        }
    }
}

impl AudioDevice for PullThreadDevice {
    fn open(&mut self, spec: &AudioSpec, sink: Arc<dyn AudioSink>) -> Result<()> {
        self.close();
        self.record.opens.fetch_add(1, Ordering::SeqCst);
        self.paused.store(true, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);

        let bytes = spec.samples as usize * spec.bytes_per_sample_frame();
        let record = self.record.clone();
        let paused = self.paused.clone();
        let closed = self.closed.clone();
        self.puller = Some(thread::spawn(move || {
            let mut buf = vec![0u8; bytes];
            while !closed.load(Ordering::SeqCst) {
                if !paused.load(Ordering::SeqCst) {
                    sink.fill(&mut buf);
                    record.bytes_pulled.fetch_add(buf.len(), Ordering::SeqCst);
                    let mut samples = record.samples.lock();
                    samples.extend(
                        buf.chunks_exact(2)
                            .map(|s| i16::from_le_bytes([s[0], s[1]]))
                            .filter(|s| *s != 0),
                    );
                }
                thread::sleep(Duration::from_millis(5));
            }
        }));
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(puller) = self.puller.take() {
            puller.join().unwrap();
            self.record.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.puller.is_some()
    }
}

/// 能打开但恢复播放失败的设备（例如输出设备刚被拔掉）
struct ResumeFailsDevice(PullThreadDevice);

impl AudioDevice for ResumeFailsDevice {
    fn open(&mut self, spec: &AudioSpec, sink: Arc<dyn AudioSink>) -> Result<()> {
        self.0.open(spec, sink)
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        if paused {
            return self.0.set_paused(true);
        }
        Err(PlayerError::AudioError("device unplugged".to_string()))
    }

    fn close(&mut self) {
        self.0.close();
    }

    fn is_open(&self) -> bool {
        self.0.is_open()
    }
}

/// 打开、恢复都成功，但回调从来不触发
#[derive(Default)]
struct SilentDevice {
    open: bool,
}

impl AudioDevice for SilentDevice {
    fn open(&mut self, _spec: &AudioSpec, _sink: Arc<dyn AudioSink>) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn set_paused(&mut self, _paused: bool) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ---------- 辅助 ----------

/// 在另一个线程里 stop，返回是否在 `limit` 内完成
fn stop_within(player: &Arc<PlayerController>, limit: Duration) -> bool {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let player = player.clone();
    thread::spawn(move || {
        player.stop();
        let _ = tx.send(());
    });
    rx.recv_timeout(limit).is_ok()
}

fn player(script: MediaScript) -> (PlayerController, Receiver<PlayerEvent>, Arc<ScriptedBackend>, Arc<DeviceRecord>) {
    let backend = ScriptedBackend::new(script);
    let record = Arc::new(DeviceRecord::default());
    let (player, rx) = PlayerController::new(
        backend.clone(),
        Box::new(PullThreadDevice::new(record.clone())),
        PlayerConfig::default(),
    );
    player.open("scripted.mkv");
    (player, rx, backend, record)
}

/// 收集事件直到 `done` 返回 true，超时 panic
fn collect_until(rx: &Receiver<PlayerEvent>, mut done: impl FnMut(&PlayerEvent) -> bool) -> Vec<PlayerEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = rx
            .recv_timeout(remaining)
            .unwrap_or_else(|_| panic!("等待事件超时，已收到 {} 个", events.len()));
        let finished = done(&event);
        events.push(event);
        if finished {
            return events;
        }
    }
}

fn is_frame(event: &PlayerEvent) -> bool {
    matches!(event, PlayerEvent::FrameReady(_))
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "等待条件超时");
        thread::sleep(Duration::from_millis(5));
    }
}

// ---------- 场景 ----------

#[test]
fn init_finished_and_playing_arrive_before_first_frame() {
    let (player, rx, _backend, _record) = player(MediaScript::av(60));
    player.play().unwrap();

    let events = collect_until(&rx, is_frame);
    let init = events
        .iter()
        .position(|e| *e == PlayerEvent::InitFinished { duration: 60 })
        .expect("没有 InitFinished");
    let playing = events
        .iter()
        .position(|e| *e == PlayerEvent::StateChanged(PlaybackState::Playing))
        .expect("没有 StateChanged(Playing)");
    assert!(init < events.len() - 1);
    assert!(playing < events.len() - 1);
    assert_eq!(player.duration(), 60);
    assert!(player.is_playing());

    // 再次 play 是空操作
    player.play().unwrap();
    player.stop();
}

#[test]
fn frames_are_copies_with_rounded_dimensions() {
    let (player, rx, _backend, _record) = player(MediaScript::av(60));
    player.play().unwrap();

    let events = collect_until(&rx, is_frame);
    let Some(PlayerEvent::FrameReady(frame)) = events.last() else {
        unreachable!()
    };
    assert_eq!((frame.width, frame.height), (64, 48));
    assert_eq!(frame.format, PixelFormat::RGB24);
    assert_eq!(frame.size, 64 * 48 * 3);
    assert_eq!(frame.data.len(), frame.size);
    player.stop();
}

#[test]
fn video_never_runs_ahead_of_audio() {
    let (player, rx, _backend, _record) = player(MediaScript::av(60));
    player.play().unwrap();

    let mut audio_time = 0.0f64;
    let mut frames = 0;
    collect_until(&rx, |event| {
        match event {
            PlayerEvent::TimeChanged(t) => audio_time = audio_time.max(*t),
            PlayerEvent::FrameReady(frame) => {
                // 时间通知和帧来自不同线程，允许差两个音频包
                assert!(
                    frame.time <= audio_time + 0.25,
                    "视频帧 {} 超前音频 {}",
                    frame.time,
                    audio_time
                );
                frames += 1;
            }
            _ => {}
        }
        frames >= 50
    });
    player.stop();
}

#[test]
fn seek_delivers_nothing_before_target() {
    let (player, rx, backend, record) = player(MediaScript::av(60));
    player.play().unwrap();

    collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= 1.0));
    // 读线程远远跑在播放前面，视频队列这时是满的
    wait_until(|| player.queue_stats().1.outstanding() == 500);
    let (audio_before, video_before) = player.queue_stats();
    player.seek(30);
    collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= 31.0));
    // seek 清空两个队列，之后从新位置重新填满
    wait_until(|| player.queue_stats().1.outstanding() == 500);
    let (audio_after, video_after) = player.queue_stats();
    player.stop();

    assert!(audio_after.cleared > audio_before.cleared);
    assert!(video_after.cleared >= video_before.cleared + 400);
    assert!(audio_after.pushed > audio_before.pushed);
    assert!(video_after.pushed > video_before.pushed);
    assert!(video_after.peak <= 500 && audio_after.peak <= 1000);

    // 以音频流为准，ts = 30 / (1/1000)
    assert_eq!(backend.seeks.lock().first(), Some(&(AUDIO_INDEX, 30_000)));

    let samples = record.samples.lock();
    let first_after = samples
        .iter()
        .position(|s| *s >= 3001)
        .expect("seek 之后没有音频数据");
    // seek 执行时播放进度远不到 20 秒；29.x 秒的数据被丢弃
    assert!(samples[..first_after].iter().all(|s| *s < 2000));
    assert!(samples[first_after..].iter().all(|s| *s >= 3001));
}

#[test]
fn failed_seek_keeps_playing() {
    let (player, rx, backend, _record) = player(MediaScript::av(60));
    player.play().unwrap();

    collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= 1.0));
    player.seek(600);
    wait_until(|| !backend.seeks.lock().is_empty());
    collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= 2.0));
    assert!(player.is_playing());
    player.stop();
}

#[test]
fn mute_outputs_silence() {
    let (player, rx, _backend, record) = player(MediaScript::av(60));
    player.set_mute(true);
    assert!(player.is_mute());
    player.play().unwrap();

    collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= 2.0));
    player.stop();

    assert!(record.bytes_pulled.load(Ordering::SeqCst) > 0);
    assert!(record.samples.lock().is_empty(), "静音时输出必须全为 0");
}

#[test]
fn volume_scales_output() {
    let (player, rx, _backend, record) = player(MediaScript::av(60));
    player.set_volume(50);
    assert_eq!(player.volume(), 50);
    player.play().unwrap();

    collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= 2.0));
    player.stop();

    // 1.0 秒的包解出 101，半音量混音后是 101 * 64 / 128 = 50
    assert!(record.samples.lock().contains(&50));
    assert!(!record.samples.lock().contains(&101));
}

#[test]
fn no_playable_stream_fails_without_frames() {
    let script = MediaScript {
        has_audio: false,
        has_video: false,
        ..MediaScript::av(10)
    };
    let (player, rx, _backend, record) = player(script);
    player.play().unwrap();

    let events = collect_until(&rx, |e| *e == PlayerEvent::StateChanged(PlaybackState::Stopped));
    assert!(events.contains(&PlayerEvent::PlayFailed));
    assert!(!events.iter().any(is_frame));
    assert!(!events.iter().any(|e| matches!(e, PlayerEvent::InitFinished { .. })));

    wait_until(|| player.duration() == 0);
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(record.opens.load(Ordering::SeqCst), 0);
    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_iter().all(|e| !is_frame(&e)));
}

#[test]
fn open_failure_reports_play_failed() {
    let script = MediaScript {
        fail_open: true,
        ..MediaScript::av(10)
    };
    let (player, rx, _backend, _record) = player(script);
    player.play().unwrap();

    let events = collect_until(&rx, |e| *e == PlayerEvent::StateChanged(PlaybackState::Stopped));
    assert!(events.contains(&PlayerEvent::PlayFailed));
    player.stop();
}

#[test]
fn play_without_open_is_an_error() {
    let (player, _rx) = PlayerController::new(
        ScriptedBackend::new(MediaScript::av(1)),
        Box::new(PullThreadDevice::new(Arc::new(DeviceRecord::default()))),
        PlayerConfig::default(),
    );
    assert!(player.play().is_err());
    assert_eq!(player.state(), PlaybackState::Stopped);
}

#[test]
fn video_only_frames_are_not_gated() {
    let script = MediaScript {
        has_audio: false,
        ..MediaScript::av(60)
    };
    let (player, rx, _backend, record) = player(script);
    player.play().unwrap();

    let mut frames = 0;
    collect_until(&rx, |e| {
        if is_frame(e) {
            frames += 1;
        }
        frames >= 100
    });
    // 没有音频时钟，视频不等任何人
    assert_eq!(player.time(), 0);
    assert_eq!(record.opens.load(Ordering::SeqCst), 0);
    player.stop();
}

#[test]
fn audio_only_plays_and_reports_time() {
    let script = MediaScript {
        has_video: false,
        ..MediaScript::av(60)
    };
    let (player, rx, _backend, _record) = player(script);
    player.play().unwrap();

    let events = collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= 3.0));
    assert!(!events.iter().any(is_frame));
    assert!(player.time() >= 3);
    player.stop();
}

#[test]
fn pause_freezes_audio_clock_and_resume_continues() {
    let (player, rx, _backend, _record) = player(MediaScript::av(60));
    player.play().unwrap();
    collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= 1.0));

    player.pause();
    collect_until(&rx, |e| *e == PlayerEvent::StateChanged(PlaybackState::Paused));
    assert_eq!(player.state(), PlaybackState::Paused);
    thread::sleep(Duration::from_millis(30));
    let frozen = player.time();
    thread::sleep(Duration::from_millis(100));
    assert_eq!(player.time(), frozen);

    // 暂停状态下再 pause 没有效果
    player.pause();
    player.play().unwrap();
    collect_until(&rx, |e| *e == PlayerEvent::StateChanged(PlaybackState::Playing));
    collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= frozen as f64 + 1.0));
    player.stop();
}

#[test]
fn stop_is_idempotent_and_resets_session() {
    let (player, rx, backend, record) = player(MediaScript::av(60));
    player.play().unwrap();
    collect_until(&rx, |e| matches!(e, PlayerEvent::TimeChanged(t) if *t >= 1.0));

    player.stop();
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.time(), 0);
    assert_eq!(player.duration(), 0);
    assert_eq!(record.closes.load(Ordering::SeqCst), 1);
    let stopped = rx
        .try_iter()
        .filter(|e| *e == PlayerEvent::StateChanged(PlaybackState::Stopped))
        .count();
    assert_eq!(stopped, 1);

    player.stop();
    assert!(rx.try_iter().all(|e| e != PlayerEvent::StateChanged(PlaybackState::Stopped)));

    // 停止之后可以重新开始一个会话
    player.play().unwrap();
    collect_until(&rx, |e| *e == PlayerEvent::StateChanged(PlaybackState::Playing));
    assert_eq!(backend.opens.load(Ordering::SeqCst), 2);
    player.stop();
}

#[test]
fn stop_during_setup_does_not_start_playing() {
    let script = MediaScript {
        open_delay: Duration::from_millis(100),
        ..MediaScript::av(60)
    };
    let (player, rx, _backend, record) = player(script);
    player.play().unwrap();
    player.stop();

    assert_eq!(player.state(), PlaybackState::Stopped);
    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_iter().all(|e| !matches!(e, PlayerEvent::StateChanged(_) | PlayerEvent::FrameReady(_))));
    assert_eq!(record.bytes_pulled.load(Ordering::SeqCst), 0);
}

#[test]
fn natural_end_stops_by_itself() {
    let script = MediaScript {
        read_error_at: Some(3),
        ..MediaScript::av(2)
    };
    let (player, rx, _backend, record) = player(script);
    player.play().unwrap();

    let events = collect_until(&rx, |e| *e == PlayerEvent::StateChanged(PlaybackState::Stopped));
    // 读错误只跳过，不影响后面的数据
    let frames = events.iter().filter(|e| is_frame(e)).count();
    assert!(frames > 40, "只交付了 {} 帧", frames);
    assert!(!events.contains(&PlayerEvent::PlayFailed));

    wait_until(|| record.closes.load(Ordering::SeqCst) == 1);
    wait_until(|| player.duration() == 0);
    assert_eq!(player.state(), PlaybackState::Stopped);

    // 再 stop 是空操作
    player.stop();
}

#[test]
fn reader_respects_queue_capacities() {
    let (player, rx, _backend, _record) = player(MediaScript::av(300));
    player.play().unwrap();
    collect_until(&rx, |e| *e == PlayerEvent::StateChanged(PlaybackState::Playing));
    // 暂停后消费方不再取包，只剩读线程往里写
    player.pause();

    wait_until(|| player.queue_stats().1.outstanding() == 500);
    thread::sleep(Duration::from_millis(100));
    let (audio, video) = player.queue_stats();
    assert_eq!(video.peak, 500);
    assert_eq!(video.outstanding(), 500);
    assert!(audio.peak <= 1000, "音频队列峰值 {}", audio.peak);
    player.stop();
}

#[test]
fn reader_respects_audio_queue_capacity() {
    let script = MediaScript {
        has_video: false,
        ..MediaScript::av(300)
    };
    let (player, rx, _backend, _record) = player(script);
    player.play().unwrap();
    collect_until(&rx, |e| *e == PlayerEvent::StateChanged(PlaybackState::Playing));
    player.pause();

    wait_until(|| player.queue_stats().0.outstanding() == 1000);
    thread::sleep(Duration::from_millis(100));
    let (audio, _) = player.queue_stats();
    assert_eq!(audio.peak, 1000);
    assert_eq!(audio.outstanding(), 1000);
    player.stop();
}

#[test]
fn stop_returns_when_audio_device_cannot_resume() {
    let backend = ScriptedBackend::new(MediaScript::av(60));
    let record = Arc::new(DeviceRecord::default());
    let (player, rx) = PlayerController::new(
        backend,
        Box::new(ResumeFailsDevice(PullThreadDevice::new(record.clone()))),
        PlayerConfig::default(),
    );
    let player = Arc::new(player);
    player.open("scripted.mkv");
    player.play().unwrap();

    // 音频放弃后按纯视频继续，画面不再等音频时钟
    let mut frames = 0;
    collect_until(&rx, |e| {
        if is_frame(e) {
            frames += 1;
        }
        frames >= 20
    });

    assert!(stop_within(&player, Duration::from_secs(5)), "stop 没有返回");
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(record.bytes_pulled.load(Ordering::SeqCst), 0);
    assert_eq!(record.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn stop_returns_after_video_thread_panics() {
    let script = MediaScript {
        convert_panics: true,
        ..MediaScript::av(60)
    };
    let (player, rx, _backend, _record) = player(script);
    let player = Arc::new(player);
    player.play().unwrap();

    collect_until(&rx, |e| *e == PlayerEvent::StateChanged(PlaybackState::Playing));
    // 给视频线程时间走到像素转换
    thread::sleep(Duration::from_millis(100));

    assert!(stop_within(&player, Duration::from_secs(5)), "stop 没有返回");
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert!(rx.try_iter().all(|e| !is_frame(&e)));
}

#[test]
fn stop_returns_when_device_never_pulls() {
    let (player, rx) = PlayerController::new(
        ScriptedBackend::new(MediaScript::av(60)),
        Box::new(SilentDevice::default()),
        PlayerConfig::default(),
    );
    let player = Arc::new(player);
    player.open("scripted.mkv");
    player.play().unwrap();
    collect_until(&rx, |e| matches!(e, PlayerEvent::InitFinished { .. }));
    thread::sleep(Duration::from_millis(50));

    assert!(stop_within(&player, Duration::from_secs(5)), "stop 没有返回");
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.time(), 0);
}
