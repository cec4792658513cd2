use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use myy_playback_core::player::{CpalAudioDevice, DemuxerSource, FfmpegBackend, FfmpegDemuxer};
use myy_playback_core::{PlaybackState, PlayerConfig, PlayerController, PlayerEvent};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 无界面播放：用默认音频设备出声，统计交付的视频帧
#[derive(Parser, Debug)]
#[command(name = "myy_play", version, about = "喜洋洋播放器内核演示")]
struct Args {
    /// 媒体文件路径
    path: PathBuf,

    /// 只打印媒体信息（JSON）
    #[arg(long)]
    probe: bool,

    /// 开始播放后跳转到指定秒数
    #[arg(long)]
    seek: Option<i64>,

    /// 音量 0..=100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,

    /// 静音
    #[arg(long)]
    mute: bool,

    /// 最多播放多少秒后停止
    #[arg(long)]
    limit: Option<u64>,

    /// JSON 配置文件
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    info!("🎬 MYY Player 内核演示启动");

    let backend = FfmpegBackend::new().context("FFmpeg 初始化失败")?;

    if args.probe {
        let demuxer = FfmpegDemuxer::open(&args.path)?;
        println!("{}", serde_json::to_string_pretty(&demuxer.media_info())?);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => PlayerConfig::from_json_file(path)
            .with_context(|| format!("读取配置失败: {}", path.display()))?,
        None => PlayerConfig::default(),
    };

    let (player, events) = PlayerController::new(Arc::new(backend), Box::new(CpalAudioDevice::new()), config);
    if let Some(volume) = args.volume {
        player.set_volume(volume);
    }
    player.set_mute(args.mute);

    player.open(&args.path);
    player.play()?;

    let started = Instant::now();
    let limit = args.limit.map(Duration::from_secs);
    let mut pending_seek = args.seek;
    let mut frames: u64 = 0;
    let mut last_reported = -1;

    loop {
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            info!("⏱️  到达播放时长上限");
            break;
        }

        let event = match events.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => event,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        match event {
            PlayerEvent::InitFinished { duration } => {
                info!("✅ 初始化完成，总时长 {}s", duration);
                if let Some(target) = pending_seek.take() {
                    player.seek(target);
                }
            }
            PlayerEvent::StateChanged(state) => {
                info!("状态: {}", state.as_str());
                if state == PlaybackState::Stopped {
                    break;
                }
            }
            PlayerEvent::TimeChanged(_) => {
                let now = player.time();
                if now != last_reported {
                    last_reported = now;
                    info!("⏯️  {}s / {}s, 已交付 {} 帧", now, player.duration(), frames);
                }
            }
            PlayerEvent::FrameReady(frame) => {
                frames += 1;
                if frames == 1 {
                    info!("🖼️  首帧 {}x{} {:?}, {} 字节", frame.width, frame.height, frame.format, frame.size);
                }
            }
            PlayerEvent::PlayFailed => {
                warn!("❌ 播放失败");
                anyhow::bail!("无法播放 {}", args.path.display());
            }
        }
    }

    player.stop();
    let (audio, video) = player.queue_stats();
    info!(
        "📦 音频包 {} (峰值 {}), 视频包 {} (峰值 {}), 清空丢弃 {}",
        audio.pushed,
        audio.peak,
        video.pushed,
        video.peak,
        audio.cleared + video.cleared
    );
    info!("⏹️  共交付 {} 帧", frames);
    Ok(())
}
