//! 音频序列器
//!
//! 单音 / 旋律的正弦合成，经 [`AudioSink`] 输出 16-bit 单声道采样块。
//! 命令经有界队列进入（producer 侧 `try_send`，绝不阻塞控制路径）；
//! 序列器每轮先排空全部待处理命令再渲染，后到的播放命令直接替换
//! 当前播放（last-wins），不排队等待。
//!
//! 振幅恒定为 0.25 × volume × i16::MAX：0.25 是防削波余量，
//! volume 是用户可调增益。相位跨块连续，换音符时清零。

use crate::config::AudioConfig;
use crate::error::CoreError;
use crate::hal::AudioSink;
use crate::state::RobotContext;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

// === 内置旋律（欢乐颂片段） ===

const NOTE_C4: f32 = 261.63;
const NOTE_D4: f32 = 293.66;
const NOTE_E4: f32 = 329.63;
const NOTE_F4: f32 = 349.23;
const NOTE_G4: f32 = 392.00;

/// (频率 Hz, 时值 ms)
const MELODY: &[(f32, u64)] = &[
    (NOTE_E4, 280),
    (NOTE_E4, 280),
    (NOTE_F4, 280),
    (NOTE_G4, 280),
    (NOTE_G4, 280),
    (NOTE_F4, 280),
    (NOTE_E4, 280),
    (NOTE_D4, 280),
    (NOTE_C4, 280),
    (NOTE_C4, 280),
    (NOTE_D4, 280),
    (NOTE_E4, 280),
    (NOTE_E4, 420),
    (NOTE_D4, 140),
    (NOTE_D4, 560),
    (NOTE_E4, 280),
    (NOTE_E4, 280),
    (NOTE_F4, 280),
    (NOTE_G4, 280),
    (NOTE_G4, 280),
    (NOTE_F4, 280),
    (NOTE_E4, 280),
    (NOTE_D4, 280),
    (NOTE_C4, 280),
    (NOTE_C4, 280),
    (NOTE_D4, 280),
    (NOTE_E4, 280),
    (NOTE_D4, 420),
    (NOTE_C4, 140),
    (NOTE_C4, 560),
];

/// 防削波余量
const AMP_HEADROOM: f32 = 0.25;

/// 音频命令
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    /// 立即停止当前播放
    Stop,
    /// 设置音量 [0, 1]（越界钳制）
    SetVolume(f32),
    /// 播放单音
    PlayTone { freq_hz: f32, duration_ms: u64 },
    /// 播放内置旋律；`looped` 时播完回绕
    PlayMelody { looped: bool },
}

/// 音频命令句柄（producer 侧）
///
/// 所有发送都是 `try_send`：队列满返回 [`CoreError::AudioChannelFull`]，
/// 队列已断开返回 [`CoreError::AudioChannelClosed`]。调用方（命令路由、
/// 控制台）可以安全地忽略满队列错误，绝不因音频阻塞。
#[derive(Clone)]
pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    capacity: usize,
}

impl AudioHandle {
    pub fn send(&self, cmd: AudioCommand) -> Result<(), CoreError> {
        match self.tx.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(CoreError::AudioChannelFull(self.capacity)),
            Err(TrySendError::Disconnected(_)) => Err(CoreError::AudioChannelClosed),
        }
    }

    pub fn play_tone(&self, freq_hz: f32, duration_ms: u64) -> Result<(), CoreError> {
        self.send(AudioCommand::PlayTone { freq_hz, duration_ms })
    }

    pub fn play_melody(&self, looped: bool) -> Result<(), CoreError> {
        self.send(AudioCommand::PlayMelody { looped })
    }

    pub fn stop(&self) -> Result<(), CoreError> {
        self.send(AudioCommand::Stop)
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), CoreError> {
        self.send(AudioCommand::SetVolume(volume))
    }
}

/// 当前播放状态
enum Playback {
    Idle,
    Tone {
        freq_hz: f32,
        remaining_ms: i64,
    },
    Melody {
        index: usize,
        remaining_ms: i64,
        looped: bool,
    },
}

/// 音频序列器（consumer 侧，音频任务独占）
///
/// 空闲时驻留在 `recv_timeout` 上，不空转；播放时逐块渲染，
/// 块间重新排空命令队列（Stop 的响应延迟以一个块为界，约 12ms@22050Hz）。
pub struct AudioSequencer<S: AudioSink> {
    rx: Receiver<AudioCommand>,
    sink: S,
    cfg: AudioConfig,
    ctx: Arc<RobotContext>,

    volume: f32,
    phase: f32,
    playback: Playback,
    chunk: Vec<i16>,
}

/// 创建序列器与其命令句柄
pub fn audio_channel<S: AudioSink>(
    cfg: AudioConfig,
    sink: S,
    ctx: Arc<RobotContext>,
) -> (AudioHandle, AudioSequencer<S>) {
    let (tx, rx) = bounded(cfg.queue_capacity);
    let handle = AudioHandle { tx, capacity: cfg.queue_capacity };

    let volume = cfg.default_volume.clamp(0.0, 1.0);
    ctx.set_audio_volume(volume);

    let chunk_samples = cfg.chunk_samples;
    let sequencer = AudioSequencer {
        rx,
        sink,
        cfg,
        ctx,
        volume,
        phase: 0.0,
        playback: Playback::Idle,
        chunk: vec![0; chunk_samples],
    };
    (handle, sequencer)
}

impl<S: AudioSink> AudioSequencer<S> {
    /// 单块时长（毫秒）
    fn chunk_ms(&self) -> i64 {
        (self.cfg.chunk_samples as u64 * 1000 / self.cfg.sample_rate_hz as u64) as i64
    }

    /// 应用一条命令
    fn handle_command(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::Stop => {
                self.playback = Playback::Idle;
                self.phase = 0.0;
            },
            AudioCommand::SetVolume(v) => {
                self.volume = v.clamp(0.0, 1.0);
                self.ctx.set_audio_volume(self.volume);
                debug!("audio volume set to {:.2}", self.volume);
            },
            AudioCommand::PlayTone { freq_hz, duration_ms } => {
                // 新播放直接替换，不等待当前播放结束
                self.phase = 0.0;
                self.playback = Playback::Tone {
                    freq_hz: freq_hz.max(0.0),
                    remaining_ms: duration_ms as i64,
                };
            },
            AudioCommand::PlayMelody { looped } => {
                self.phase = 0.0;
                self.playback = Playback::Melody {
                    index: 0,
                    remaining_ms: MELODY[0].1 as i64,
                    looped,
                };
            },
        }
    }

    /// 排空全部待处理命令；队列断开返回 false
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(crossbeam_channel::TryRecvError::Empty) => return true,
                Err(crossbeam_channel::TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// 渲染并输出一个采样块，推进播放状态
    fn render_chunk(&mut self) {
        let chunk_ms = self.chunk_ms();
        let freq = match &self.playback {
            Playback::Idle => return,
            Playback::Tone { freq_hz, .. } => *freq_hz,
            Playback::Melody { index, .. } => MELODY[*index].0,
        };

        let amp = AMP_HEADROOM * self.volume * i16::MAX as f32;
        let phase_step = TAU * freq / self.cfg.sample_rate_hz as f32;
        for sample in self.chunk.iter_mut() {
            *sample = (self.phase.sin() * amp) as i16;
            self.phase += phase_step;
            if self.phase >= TAU {
                self.phase -= TAU;
            }
        }
        self.sink.write_samples(&self.chunk);

        // 推进剩余时值；音符/播放结束的处理
        match &mut self.playback {
            Playback::Idle => {},
            Playback::Tone { remaining_ms, .. } => {
                *remaining_ms -= chunk_ms;
                if *remaining_ms <= 0 {
                    self.playback = Playback::Idle;
                    self.phase = 0.0;
                }
            },
            Playback::Melody { index, remaining_ms, looped } => {
                *remaining_ms -= chunk_ms;
                if *remaining_ms <= 0 {
                    *index += 1;
                    if *index >= MELODY.len() {
                        if *looped {
                            *index = 0;
                        } else {
                            self.playback = Playback::Idle;
                            self.phase = 0.0;
                            return;
                        }
                    }
                    // 换音符：相位清零避免跨音符的相位残留
                    *remaining_ms = MELODY[*index].1 as i64;
                    self.phase = 0.0;
                }
            },
        }
    }

    fn is_idle(&self) -> bool {
        matches!(self.playback, Playback::Idle)
    }

    /// 序列器主循环（音频任务入口）；命令队列断开后返回
    pub fn run(mut self) {
        debug!("audio sequencer started");
        loop {
            if !self.drain_commands() {
                break;
            }

            if self.is_idle() {
                // 空闲驻留：阻塞等待下一条命令，超时只为检查退出
                match self.rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(RecvTimeoutError::Timeout) => {},
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                self.render_chunk();
            }
        }
        debug!("audio command channel closed, sequencer exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// 记录式音频输出：保留全部写入的块
    #[derive(Clone, Default)]
    struct RecordingSink {
        chunks: Arc<Mutex<Vec<Vec<i16>>>>,
    }

    impl AudioSink for RecordingSink {
        fn write_samples(&mut self, samples: &[i16]) {
            self.chunks.lock().push(samples.to_vec());
        }
    }

    fn sequencer() -> (AudioHandle, AudioSequencer<RecordingSink>, RecordingSink, Arc<RobotContext>)
    {
        let ctx = Arc::new(RobotContext::new());
        let sink = RecordingSink::default();
        let (handle, seq) = audio_channel(AudioConfig::default(), sink.clone(), ctx.clone());
        (handle, seq, sink, ctx)
    }

    #[test]
    fn test_default_volume_mirrored_at_startup() {
        let (_handle, _seq, _sink, ctx) = sequencer();
        assert_eq!(ctx.audio_volume(), 0.20);
    }

    #[test]
    fn test_idle_renders_nothing() {
        let (_handle, mut seq, sink, _ctx) = sequencer();
        assert!(seq.drain_commands());
        seq.render_chunk();
        assert!(sink.chunks.lock().is_empty());
    }

    #[test]
    fn test_tone_renders_until_duration_elapsed() {
        let (handle, mut seq, sink, _ctx) = sequencer();
        // 22050Hz / 256 样本 ≈ 11ms/块；100ms ≈ 9 块（向上取整）
        handle.play_tone(440.0, 100).unwrap();
        assert!(seq.drain_commands());

        let mut rendered = 0;
        while !seq.is_idle() {
            seq.render_chunk();
            rendered += 1;
            assert!(rendered < 64, "tone must terminate");
        }
        let chunk_ms = 256u64 * 1000 / 22050;
        let expected = 100u64.div_ceil(chunk_ms) as i64;
        assert_eq!(rendered, expected);
        assert_eq!(sink.chunks.lock().len(), rendered as usize);
    }

    #[test]
    fn test_samples_bounded_by_headroom() {
        let (handle, mut seq, sink, _ctx) = sequencer();
        handle.set_volume(1.0).unwrap();
        handle.play_tone(440.0, 50).unwrap();
        assert!(seq.drain_commands());
        seq.render_chunk();

        let max_amp = (AMP_HEADROOM * i16::MAX as f32) as i16;
        let chunks = sink.chunks.lock();
        assert!(
            chunks[0].iter().all(|&s| s.abs() <= max_amp),
            "samples stay within headroom even at full volume"
        );
        // 非零音量下确有信号
        assert!(chunks[0].iter().any(|&s| s != 0));
    }

    #[test]
    fn test_stop_mid_playback_returns_to_idle() {
        // 播放中 Stop → 下一轮排空后回到空闲
        let (handle, mut seq, _sink, _ctx) = sequencer();
        handle.play_melody(true).unwrap();
        assert!(seq.drain_commands());
        seq.render_chunk();
        assert!(!seq.is_idle());

        handle.stop().unwrap();
        assert!(seq.drain_commands());
        assert!(seq.is_idle());
    }

    #[test]
    fn test_new_play_replaces_current() {
        // last-wins：后到的播放命令直接替换当前播放
        let (handle, mut seq, _sink, _ctx) = sequencer();
        handle.play_melody(false).unwrap();
        handle.play_tone(880.0, 30).unwrap();
        assert!(seq.drain_commands());
        match seq.playback {
            Playback::Tone { freq_hz, .. } => assert_eq!(freq_hz, 880.0),
            _ => panic!("tone should replace melody"),
        }
    }

    #[test]
    fn test_melody_non_looped_finishes() {
        let (handle, mut seq, _sink, _ctx) = sequencer();
        handle.play_melody(false).unwrap();
        assert!(seq.drain_commands());

        // 总时值 ≈ 30 音符 × 280-560ms；上限足够即可
        let mut rendered = 0;
        while !seq.is_idle() {
            seq.render_chunk();
            rendered += 1;
            assert!(rendered < 4096, "melody must terminate when not looped");
        }
        assert!(rendered > 0);
    }

    #[test]
    fn test_melody_looped_wraps_around() {
        let (handle, mut seq, _sink, _ctx) = sequencer();
        handle.play_melody(true).unwrap();
        assert!(seq.drain_commands());

        for _ in 0..4096 {
            seq.render_chunk();
        }
        assert!(!seq.is_idle(), "looped melody never ends on its own");
    }

    #[test]
    fn test_volume_clamped_and_mirrored() {
        let (handle, mut seq, _sink, ctx) = sequencer();
        handle.set_volume(2.5).unwrap();
        assert!(seq.drain_commands());
        assert_eq!(ctx.audio_volume(), 1.0);

        handle.set_volume(-0.5).unwrap();
        assert!(seq.drain_commands());
        assert_eq!(ctx.audio_volume(), 0.0);
    }

    #[test]
    fn test_full_queue_reports_error_without_blocking() {
        let (handle, _seq, _sink, _ctx) = sequencer();
        // 容量 8：填满后 try_send 立即报错
        for _ in 0..8 {
            handle.play_tone(440.0, 10).unwrap();
        }
        let err = handle.play_tone(440.0, 10).unwrap_err();
        assert!(matches!(err, CoreError::AudioChannelFull(8)));
    }

    #[test]
    fn test_closed_queue_reports_error() {
        let (handle, seq, _sink, _ctx) = sequencer();
        drop(seq);
        let err = handle.stop().unwrap_err();
        assert!(matches!(err, CoreError::AudioChannelClosed));
    }
}
