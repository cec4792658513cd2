use crate::core::PlaybackState;
use crate::player::audio_output::{mix_audio_s16, mix_volume, AudioSink};
use crate::player::demuxer_source::AudioDecoder;
use crate::player::events::PlayerEvent;
use crate::player::free_gate::Subsystem;
use crate::player::session::SessionShared;
use log::{debug, trace, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// 解码后的音频块：重采样输出缓冲区 + 已交给设备的读游标
struct AudioChunk {
    buf: Vec<u8>,
    len: usize,
    pos: usize,
}

impl AudioChunk {
    fn remaining(&self) -> usize {
        self.len - self.pos
    }
}

struct AudioState {
    decoder: Box<dyn AudioDecoder>,
    chunk: AudioChunk,
    /// 解码器对应的 seek 序号，变化后先冲刷解码器
    serial: u64,
    decoded_packets: u64,
    discarded_packets: u64,
    silence_chunks: u64,
}

/// 音频管线
///
/// 由音频设备在它自己的线程里拉取（`AudioSink::fill`）：
/// 从音频队列取包 → 解码 → 重采样到设备固定格式 → 按音量混进设备缓冲区。
/// 不会在回调里等待，队列空了就用静音顶上。
pub struct AudioPipeline {
    shared: Arc<SessionShared>,
    state: Mutex<AudioState>,
}

impl AudioPipeline {
    pub fn new(shared: Arc<SessionShared>, decoder: Box<dyn AudioDecoder>) -> Self {
        let capacity = shared.config.audio_chunk_capacity_bytes();
        Self {
            state: Mutex::new(AudioState {
                decoder,
                chunk: AudioChunk {
                    buf: vec![0; capacity],
                    len: 0,
                    pos: 0,
                },
                serial: shared.clock.seek_serial(),
                decoded_packets: 0,
                discarded_packets: 0,
                silence_chunks: 0,
            }),
            shared,
        }
    }

    /// 解码下一个包到音频块，返回重采样得到的字节数（0 表示这一轮没有数据）
    fn decode_next(&self, state: &mut AudioState) -> usize {
        let clock = &self.shared.clock;
        // 先取序号再弹包：弹出之后序号变了，说明这个包可能是 seek 之前的
        let serial = clock.seek_serial();
        if serial != state.serial {
            state.decoder.flush();
            state.serial = serial;
            trace!("音频解码器已冲刷 (serial={})", serial);
        }

        let packet = match self.shared.audio_queue.pop_front_or_empty() {
            Some(packet) => packet,
            None => return 0,
        };

        // 音频时钟取解码时间戳
        let time = packet.dts_seconds().or_else(|| packet.pts_seconds());

        if let Some(target) = clock.audio_seek() {
            match time {
                Some(t) if t >= target as f64 => clock.clear_audio_seek(),
                _ => {
                    state.discarded_packets += 1;
                    return 0;
                }
            }
        }

        if let Some(t) = time {
            if !clock.set_audio_time_at(serial, t) {
                state.discarded_packets += 1;
                return 0;
            }
            self.shared.emit(PlayerEvent::TimeChanged(t));
            self.shared.clock_changed.notify();
        }

        if let Err(e) = state.decoder.send_packet(&packet) {
            warn!("音频包送入解码器失败: {}", e);
            return 0;
        }
        drop(packet);

        let decoded = match state.decoder.receive_resampled(&mut state.chunk.buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("音频解码/重采样失败: {}", e);
                0
            }
        };

        if clock.seek_serial() != serial {
            state.discarded_packets += 1;
            return 0;
        }
        state.decoded_packets += 1;
        decoded
    }

    /// 填一个新的音频块；没有可用数据时填固定大小的静音
    fn refill(&self, state: &mut AudioState) {
        let decoded = self.decode_next(state);
        if decoded == 0 {
            let silence = self.shared.config.silence_chunk_bytes.min(state.chunk.buf.len());
            state.chunk.buf[..silence].fill(0);
            state.chunk.len = silence;
            state.silence_chunks += 1;
        } else {
            state.chunk.len = decoded;
        }
        state.chunk.pos = 0;
    }
}

impl AudioSink for AudioPipeline {
    fn fill(&self, out: &mut [u8]) {
        out.fill(0);

        let mut state = self.state.lock();
        let mut written = 0;
        while written < out.len() {
            match self.shared.state() {
                PlaybackState::Paused => break,
                PlaybackState::Stopped => {
                    self.shared.gate.mark_freeable(Subsystem::Audio);
                    break;
                }
                PlaybackState::Playing => {}
            }

            if state.chunk.remaining() == 0 {
                self.refill(&mut state);
                if state.chunk.len == 0 {
                    break;
                }
            }

            let len = state.chunk.remaining().min(out.len() - written);
            let volume = mix_volume(self.shared.volume(), self.shared.is_muted());
            let start = state.chunk.pos;
            mix_audio_s16(&mut out[written..written + len], &state.chunk.buf[start..start + len], volume);
            state.chunk.pos += len;
            written += len;
        }
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        debug!(
            "🔊 音频管线释放: 解码 {} 包, 丢弃 {} 包, 静音块 {}",
            state.decoded_packets, state.discarded_packets, state.silence_chunks
        );
    }
}
