use crate::core::{DecodedVideoFrame, PlaybackState};
use crate::player::demuxer_source::{DecodedPicture, VideoDecoder};
use crate::player::events::PlayerEvent;
use crate::player::free_gate::Subsystem;
use crate::player::session::SessionShared;
use log::{debug, info, trace, warn};
use std::process;
use std::sync::Arc;
use std::thread;

fn log_ctx() -> String {
    format!("[pid:{} tid:{:?}]", process::id(), thread::current().id())
}

/// 视频管线（独立线程）
///
/// 取包 → 解码 → 丢弃 seek 目标之前的帧 → 像素转换 → 等音频追上 → 拷贝一份交给渲染方。
pub struct VideoPipeline {
    shared: Arc<SessionShared>,
    decoder: Box<dyn VideoDecoder>,
    /// 转换工作缓冲区，每帧复用，从不直接交出去
    buffer: Vec<u8>,
    serial: u64,
    delivered: u64,
    discarded: u64,
}

impl VideoPipeline {
    pub fn new(shared: Arc<SessionShared>, decoder: Box<dyn VideoDecoder>) -> Self {
        let serial = shared.clock.seek_serial();
        Self {
            shared,
            decoder,
            buffer: Vec::new(),
            serial,
            delivered: 0,
            discarded: 0,
        }
    }

    pub fn run(mut self) {
        let shared = self.shared.clone();
        let _freeable = shared.gate.guard(Subsystem::Video);

        let spec = self.decoder.output_spec();
        info!(
            "{} 🎞️ 视频线程启动: 输出 {}x{} {:?}",
            log_ctx(),
            spec.width,
            spec.height,
            spec.pixel_format
        );
        let poll = self.shared.config.sync_poll();

        loop {
            // 暂停且没有 seek 时睡在状态通知上；有 seek 时继续解码，让画面停在目标位置
            {
                let shared = &self.shared;
                shared.state_changed.wait_until(poll, || {
                    shared.state() != PlaybackState::Paused || shared.clock.video_seek().is_some()
                });
            }
            if self.shared.is_stopped() {
                break;
            }

            let serial = self.shared.clock.seek_serial();
            if serial != self.serial {
                self.decoder.flush();
                self.serial = serial;
                debug!("{} 视频解码器已冲刷 (serial={})", log_ctx(), serial);
            }

            let packet = match self.shared.video_queue.pop_front_timeout(poll) {
                Some(packet) => packet,
                None => continue,
            };
            if self.shared.clock.seek_serial() != serial {
                // seek 之前的包
                self.discarded += 1;
                continue;
            }

            if let Some(t) = packet.pts_seconds() {
                self.shared.clock.set_video_time_at(serial, t);
            }

            if let Err(e) = self.decoder.send_packet(&packet) {
                warn!("{} ⚠️  视频包送入解码器失败: {}", log_ctx(), e);
                continue;
            }
            drop(packet);

            // 一个包可能解出零帧或多帧
            loop {
                match self.decoder.receive_frame() {
                    Ok(Some(picture)) => self.deliver(picture, serial),
                    Ok(None) => break,
                    Err(e) => {
                        warn!("{} ⚠️  视频解码失败: {}", log_ctx(), e);
                        break;
                    }
                }
            }
        }

        info!(
            "{} 🛑 视频线程退出: 交付 {} 帧, 丢弃 {}",
            log_ctx(),
            self.delivered,
            self.discarded
        );
    }

    fn deliver(&mut self, picture: DecodedPicture, serial: u64) {
        let clock = &self.shared.clock;
        if clock.seek_serial() != serial {
            self.discarded += 1;
            return;
        }

        let time = picture.time.unwrap_or_else(|| clock.video_time());
        if let Some(target) = clock.video_seek() {
            if time < target as f64 {
                // 关键帧到目标之间的帧要解码（参考帧），但不显示
                self.discarded += 1;
                return;
            }
            clock.clear_video_seek();
        }

        if let Err(e) = self.decoder.convert_into(&mut self.buffer) {
            warn!("{} ⚠️  像素格式转换失败: {}", log_ctx(), e);
            return;
        }

        self.wait_for_audio(serial);
        if clock.seek_serial() != serial {
            self.discarded += 1;
            return;
        }

        let spec = self.decoder.output_spec();
        let frame = DecodedVideoFrame {
            data: self.buffer.clone(),
            width: spec.width,
            height: spec.height,
            format: spec.pixel_format,
            size: spec.size,
            time,
        };
        self.delivered += 1;
        trace!("交付视频帧 #{} t={:.3}", self.delivered, time);
        self.shared.emit(PlayerEvent::FrameReady(frame));
    }

    /// 音频是主时钟：视频时钟超前时等待音频追上
    ///
    /// 没有音频轨、不在播放状态、或者音频队列已经空了（文件尾）时直接放行。
    fn wait_for_audio(&self, serial: u64) {
        let shared = &self.shared;
        if !shared.has_audio() {
            return;
        }
        shared.clock_changed.wait_until(shared.config.sync_poll(), || {
            let clock = &shared.clock;
            let ahead = clock.video_time() > clock.audio_time();
            !ahead
                || shared.state() != PlaybackState::Playing
                || shared.audio_queue.is_empty()
                || clock.seek_serial() != serial
        });
    }
}
