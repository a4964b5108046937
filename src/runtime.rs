//! 运行时调度
//!
//! 每类活动一个命名线程：sensor（采样+去抖+发布）、drive（控制 tick）、
//! audio（序列器）、backend（状态推送）。任务间只通过共享上下文和
//! 有界命令队列交互，没有任务间直接调用。
//!
//! 停机协议：`running` 置 false 后各周期任务在下一个 tick 退出；
//! 音频任务靠命令队列断开退出。Drop 时逐个 join，电机停止由 drive
//! 任务退出前的最后一次归零保证。

use crate::audio::{AudioHandle, audio_channel};
use crate::clock::monotonic_millis;
use crate::command::CommandRouter;
use crate::config::FirmwareConfig;
use crate::drive::DriveController;
use crate::error::CoreError;
use crate::hal::{AudioSink, BackendSink, DigitalInput, LuxSensor, MotorDriver};
use crate::sensor::SensorSuite;
use crate::state::{RobotContext, StatusSnapshot};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// 外设集合（协作方注入的全部硬件实现）
pub struct Peripherals<D, L, M, A, B>
where
    D: DigitalInput + Send + 'static,
    L: LuxSensor + Send + 'static,
    M: MotorDriver + Send + 'static,
    A: AudioSink + Send + 'static,
    B: BackendSink + Send + 'static,
{
    pub ir_left: D,
    pub ir_mid: D,
    pub ir_right: D,
    pub lux: L,
    pub motor: M,
    pub audio_sink: A,
    pub backend: B,
}

/// 机器人运行时
///
/// 持有全部任务句柄；Drop 时发出停机信号并 join 所有线程。
///
/// # Example
///
/// ```no_run
/// use teletable_core::config::FirmwareConfig;
/// use teletable_core::runtime::{Peripherals, RobotRuntime};
/// # use teletable_core::hal::*;
/// # use teletable_core::state::StatusSnapshot;
/// # use teletable_core::error::CoreError;
/// # struct Pin; impl DigitalInput for Pin { fn read_raw(&mut self) -> bool { true } }
/// # struct Lux; impl LuxSensor for Lux { fn read_lux(&mut self) -> Option<f32> { None } }
/// # struct Motor; impl MotorDriver for Motor { fn set_duty(&mut self, _: MotorSide, _: f32) {} }
/// # struct Spk; impl AudioSink for Spk { fn write_samples(&mut self, _: &[i16]) {} }
/// # struct Net; impl BackendSink for Net {
/// #     fn is_live(&self) -> bool { false }
/// #     fn push(&mut self, _: &StatusSnapshot) -> Result<(), CoreError> { Ok(()) }
/// # }
///
/// let runtime = RobotRuntime::spawn(
///     FirmwareConfig::default(),
///     Peripherals {
///         ir_left: Pin, ir_mid: Pin, ir_right: Pin,
///         lux: Lux, motor: Motor, audio_sink: Spk, backend: Net,
///     },
/// ).unwrap();
/// if let Some(router) = runtime.router() {
///     router.set_mode_str("MANUAL", 0);
/// }
/// drop(runtime); // 停机并 join
/// ```
pub struct RobotRuntime<M: MotorDriver + Send + 'static> {
    running: Arc<AtomicBool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,

    ctx: Arc<RobotContext>,
    drive: Arc<Mutex<DriveController<M>>>,
    // Option 包装：shutdown 时先析构全部 Sender，音频任务才能退出
    audio: Option<AudioHandle>,
    router: Option<CommandRouter<M>>,
}

impl<M: MotorDriver + Send + 'static> RobotRuntime<M> {
    /// 启动全部任务
    pub fn spawn<D, L, A, B>(
        cfg: FirmwareConfig,
        peripherals: Peripherals<D, L, M, A, B>,
    ) -> Result<Self, CoreError>
    where
        D: DigitalInput + Send + 'static,
        L: LuxSensor + Send + 'static,
        A: AudioSink + Send + 'static,
        B: BackendSink + Send + 'static,
    {
        let Peripherals { ir_left, ir_mid, ir_right, lux, motor, audio_sink, backend } =
            peripherals;

        let ctx = Arc::new(RobotContext::new());
        let running = Arc::new(AtomicBool::new(true));
        let now = monotonic_millis();

        let drive = Arc::new(Mutex::new(DriveController::new(cfg.drive.clone(), motor, now)));
        let (audio, sequencer) = audio_channel(cfg.audio.clone(), audio_sink, ctx.clone());
        let router = CommandRouter::new(ctx.clone(), drive.clone(), audio.clone());

        let mut handles = Vec::with_capacity(4);

        // === sensor 任务 ===
        {
            let running = running.clone();
            let ctx = ctx.clone();
            let sensor_cfg = cfg.sensor.clone();
            let tick = Duration::from_millis(cfg.runtime.sensor_tick_ms);
            let handle = thread::Builder::new()
                .name("sensor".to_string())
                .spawn(move || {
                    let mut suite = SensorSuite::new(
                        &sensor_cfg,
                        ir_left,
                        ir_mid,
                        ir_right,
                        lux,
                        monotonic_millis(),
                    );
                    let sleeper = spin_sleep::SpinSleeper::default();
                    while running.load(Ordering::Acquire) {
                        let now = monotonic_millis();
                        suite.update(now);
                        ctx.publish_sensors(suite.summary(now));
                        sleeper.sleep(tick);
                    }
                })
                .map_err(|e| CoreError::TaskSpawn { task: "sensor", source: e })?;
            handles.push(("sensor", handle));
        }

        // === drive 任务 ===
        {
            let running = running.clone();
            let ctx = ctx.clone();
            let drive = drive.clone();
            let tick = Duration::from_millis(cfg.runtime.drive_tick_ms);
            let handle = thread::Builder::new()
                .name("drive".to_string())
                .spawn(move || {
                    #[cfg(feature = "realtime")]
                    {
                        use thread_priority::{ThreadPriority, set_current_thread_priority};
                        if let Err(e) = set_current_thread_priority(ThreadPriority::Max) {
                            warn!("failed to raise drive thread priority: {e:?}");
                        }
                    }
                    let sleeper = spin_sleep::SpinSleeper::default();
                    while running.load(Ordering::Acquire) {
                        let now = monotonic_millis();
                        let obstacle = ctx.sensors.load().front_obstacle();
                        let mode = ctx.drive_mode();
                        drive.lock().update(now, mode, obstacle);
                        sleeper.sleep(tick);
                    }
                    // 退出前最后一次归零，停机后电机不保持输出
                    drive.lock().stop(monotonic_millis());
                })
                .map_err(|e| CoreError::TaskSpawn { task: "drive", source: e })?;
            handles.push(("drive", handle));
        }

        // === audio 任务 ===
        {
            let handle = thread::Builder::new()
                .name("audio".to_string())
                .spawn(move || sequencer.run())
                .map_err(|e| CoreError::TaskSpawn { task: "audio", source: e })?;
            handles.push(("audio", handle));
        }

        // === backend 任务 ===
        {
            let running = running.clone();
            let ctx = ctx.clone();
            let push_period = Duration::from_millis(cfg.runtime.backend_push_ms);
            let status_log_ms = cfg.runtime.status_log_ms;
            let handle = thread::Builder::new()
                .name("backend".to_string())
                .spawn(move || {
                    let mut backend = backend;
                    let mut last_log_ms = 0u64;
                    let sleeper = spin_sleep::SpinSleeper::default();
                    while running.load(Ordering::Acquire) {
                        let snapshot = StatusSnapshot::capture(&ctx);

                        // 节流状态日志行
                        let now = monotonic_millis();
                        if now.saturating_sub(last_log_ms) >= status_log_ms {
                            last_log_ms = now;
                            info!(
                                "status: mode={} pos={} obs[{}{}{}] lux={:?} health={}",
                                snapshot.backend_mode,
                                snapshot.position,
                                snapshot.obstacle_left as u8,
                                snapshot.obstacle_mid as u8,
                                snapshot.obstacle_right as u8,
                                snapshot.lux,
                                snapshot.system_health,
                            );
                        }

                        // 链路不可用时跳过本轮，不重试不报错
                        if backend.is_live() {
                            if let Err(e) = backend.push(&snapshot) {
                                warn!("backend push failed: {e}");
                            }
                        }
                        sleeper.sleep(push_period);
                    }
                })
                .map_err(|e| CoreError::TaskSpawn { task: "backend", source: e })?;
            handles.push(("backend", handle));
        }

        info!("robot runtime started ({} tasks)", handles.len());
        Ok(Self {
            running,
            handles,
            ctx,
            drive,
            audio: Some(audio),
            router: Some(router),
        })
    }

    /// 运行时是否仍在运行
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 共享上下文
    pub fn context(&self) -> &Arc<RobotContext> {
        &self.ctx
    }

    /// 命令路由器（所有命令源的入口）；shutdown 之后返回 None
    pub fn router(&self) -> Option<&CommandRouter<M>> {
        self.router.as_ref()
    }

    /// 音频命令句柄；shutdown 之后返回 None
    pub fn audio(&self) -> Option<&AudioHandle> {
        self.audio.as_ref()
    }

    /// 驱动控制器共享句柄（诊断用）
    pub fn drive(&self) -> &Arc<Mutex<DriveController<M>>> {
        &self.drive
    }

    /// 发出停机信号并 join 全部任务
    pub fn shutdown(&mut self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("robot runtime shutting down");

        // 先析构全部命令 Sender：音频任务在队列断开后退出
        self.router = None;
        self.audio = None;

        for (name, handle) in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("task '{name}' panicked during shutdown");
            }
        }
        info!("robot runtime stopped");
    }
}

impl<M: MotorDriver + Send + 'static> Drop for RobotRuntime<M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
