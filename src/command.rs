//! 命令路由
//!
//! 所有命令源（控制台、遥控链路、协作方回调）收敛到同一个入口：
//! [`CommandRouter::dispatch`]。并发写入不做仲裁队列，直接写同一组
//! 驱动目标，最后写入者获胜；陈旧命令由驱动回路的 MANUAL 超时治理。
//!
//! 路由方法不返回错误：无效数值钳制、未知模式忽略、音频队列满降级为
//! 日志，命令路径上没有会传播回发送方的失败。

use crate::audio::AudioHandle;
use crate::drive::DriveController;
use crate::hal::MotorDriver;
use crate::state::{DriveMode, RobotContext};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 机器人命令
#[derive(Debug, Clone, PartialEq)]
pub enum RobotCommand {
    /// 路线指派（无真实导航，只更新状态与模式）
    Navigate { start: String, end: String },
    /// 速度指令：linear=油门，angular=转向，均 [-1, 1]
    Drive { linear: f32, angular: f32 },
    /// 立即停止
    Stop,
    /// 模式切换
    SetMode(DriveMode),
}

/// 命令路由器
///
/// 驱动控制器经 `Arc<Mutex<_>>` 共享：drive 任务每 tick 持锁，
/// 命令路径上的临界区只覆盖一次目标写入，不跨 I/O 持锁。
pub struct CommandRouter<M: MotorDriver> {
    ctx: Arc<RobotContext>,
    drive: Arc<Mutex<DriveController<M>>>,
    audio: AudioHandle,
}

impl<M: MotorDriver> CommandRouter<M> {
    pub fn new(
        ctx: Arc<RobotContext>,
        drive: Arc<Mutex<DriveController<M>>>,
        audio: AudioHandle,
    ) -> Self {
        Self { ctx, drive, audio }
    }

    /// 处理一条命令
    pub fn dispatch(&self, cmd: RobotCommand, now_ms: u64) {
        match cmd {
            RobotCommand::Navigate { start, end } => {
                info!("navigate: {} -> {}", start, end);
                {
                    let mut robot = self.ctx.robot.write();
                    robot.last_route_start = start;
                    robot.last_route_end = end;
                    robot.drive_mode = DriveMode::Auto;
                    robot.position = "MOVING".to_string();
                }
                // 确认提示音；队列满不是错误，降级为日志
                if let Err(e) = self.audio.play_tone(880.0, 120) {
                    debug!("navigate chirp dropped: {e}");
                }
            },
            RobotCommand::Drive { linear, angular } => {
                {
                    let mut robot = self.ctx.robot.write();
                    robot.drive_mode = DriveMode::Manual;
                    robot.position = "MOVING".to_string();
                }
                // 非有限/越界输入由控制器钳制，不拒绝
                self.drive.lock().set_targets(linear, angular, false, now_ms);
            },
            RobotCommand::Stop => {
                info!("stop command received");
                self.drive.lock().stop(now_ms);
                let mut robot = self.ctx.robot.write();
                robot.drive_mode = DriveMode::Idle;
                if robot.position == "MOVING" {
                    robot.position = "Home".to_string();
                }
            },
            RobotCommand::SetMode(mode) => {
                info!("drive mode -> {}", mode.as_str());
                // 进入 IDLE 的路径必须同时下发一次立即归零
                if mode == DriveMode::Idle {
                    self.drive.lock().stop(now_ms);
                }
                let mut robot = self.ctx.robot.write();
                robot.drive_mode = mode;
                if mode == DriveMode::Idle {
                    robot.ensure_home_if_empty();
                }
            },
        }
    }

    /// 从协议字符串解析模式并切换；未知字符串忽略（失败软化）
    pub fn set_mode_str(&self, mode: &str, now_ms: u64) {
        match DriveMode::parse(mode) {
            Some(m) => self.dispatch(RobotCommand::SetMode(m), now_ms),
            None => warn!("unknown drive mode '{}', ignored", mode),
        }
    }
}
