//! # Teletable 控制核心
//!
//! 小型双轮差速送物机器人的板上控制核心：传感器去抖、驱动闭环、
//! 命令路由、音频序列器与按活动划分的线程运行时。
//!
//! 硬件与协作方（PWM、IR、I2S、后端链路）全部隐藏在 [`hal`] 的
//! trait 边界之后，核心逻辑可以在宿主机上完整测试。
//!
//! ## 快速开始
//!
//! ```no_run
//! use teletable_core::config::FirmwareConfig;
//! use teletable_core::runtime::{Peripherals, RobotRuntime};
//! # use teletable_core::hal::*;
//! # use teletable_core::state::StatusSnapshot;
//! # use teletable_core::error::CoreError;
//! # struct Pin; impl DigitalInput for Pin { fn read_raw(&mut self) -> bool { true } }
//! # struct Lux; impl LuxSensor for Lux { fn read_lux(&mut self) -> Option<f32> { None } }
//! # struct Motor; impl MotorDriver for Motor { fn set_duty(&mut self, _: MotorSide, _: f32) {} }
//! # struct Spk; impl AudioSink for Spk { fn write_samples(&mut self, _: &[i16]) {} }
//! # struct Net; impl BackendSink for Net {
//! #     fn is_live(&self) -> bool { false }
//! #     fn push(&mut self, _: &StatusSnapshot) -> Result<(), CoreError> { Ok(()) }
//! # }
//!
//! let runtime = RobotRuntime::spawn(
//!     FirmwareConfig::default(),
//!     Peripherals {
//!         ir_left: Pin, ir_mid: Pin, ir_right: Pin,
//!         lux: Lux, motor: Motor, audio_sink: Spk, backend: Net,
//!     },
//! )?;
//!
//! if let Some(audio) = runtime.audio() {
//!     audio.play_melody(false)?;
//! }
//! if let Some(router) = runtime.router() {
//!     router.set_mode_str("MANUAL", 0);
//! }
//! # Ok::<(), teletable_core::error::CoreError>(())
//! ```
//!
//! ## 安全模型
//!
//! - 前向障碍闭锁在驱动 tick 内部强制执行，任何命令源都无法绕过
//!   （诊断用的直接电机接口除外）
//! - MANUAL 模式下命令超时后目标软衰减为零（经转换速率，不是硬切断）
//! - 协作方故障（后端断线、音频队列满、光照读取失败）降级为日志或
//!   跳过，绝不进入控制回路

pub mod audio;
pub mod clock;
pub mod command;
pub mod config;
pub mod drive;
pub mod error;
pub mod hal;
pub mod runtime;
pub mod sensor;
pub mod state;

pub use audio::{AudioCommand, AudioHandle};
pub use command::{CommandRouter, RobotCommand};
pub use config::FirmwareConfig;
pub use drive::DriveController;
pub use error::CoreError;
pub use runtime::{Peripherals, RobotRuntime};
pub use sensor::{DebouncedInput, SensorSuite};
pub use state::{DriveMode, RobotContext, SensorSummary, StatusSnapshot};
