//! 共享机器人状态
//!
//! 全局可变共享状态收敛为一个受锁保护的聚合结构（`RobotContext`），
//! 按引用注入到所有需要它的组件，无环境全局变量。
//!
//! 同步分层（与访问频率匹配）：
//! - 热数据（驱动 tick 每次读取）：`SensorSummary`，ArcSwap 无锁读取
//! - 温数据（命令处理 / 遥测快照）：`RobotState`，`parking_lot::RwLock`
//! - 音量镜像：AtomicU32（f32 位模式），单写多读
//!
//! 任何非属主任务的访问都必须走最小临界区（读出拷贝或单字段写入），
//! 绝不跨 I/O 持锁。

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// 驱动模式
///
/// 进入 `Idle` 的路径必须同时下发一次立即归零目标（由
/// [`CommandRouter`](crate::command::CommandRouter) 保证，状态层不主动执行）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    #[default]
    Idle,
    Manual,
    /// 占位状态：没有真实的导航状态机，不做路径规划
    Auto,
}

impl DriveMode {
    /// 协议字符串形式（setMode / 遥测）
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveMode::Idle => "IDLE",
            DriveMode::Manual => "MANUAL",
            DriveMode::Auto => "AUTO",
        }
    }

    /// 从协议字符串解析；未知字符串返回 None（失败软化，调用方忽略）
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(DriveMode::Idle),
            "MANUAL" => Some(DriveMode::Manual),
            "AUTO" => Some(DriveMode::Auto),
            _ => None,
        }
    }
}

/// 传感器汇总（热数据）
///
/// 由 sensor 任务整体发布（ArcSwap store），驱动 tick 与遥测无锁读取，
/// 不会观察到半更新的多字段状态。
#[derive(Debug, Clone, Default)]
pub struct SensorSummary {
    pub obstacle_left: bool,
    pub obstacle_mid: bool,
    pub obstacle_right: bool,
    /// 环境光照度（lx）；读取失败为 None（"no reading"）
    pub lux: Option<f32>,
    pub updated_at_ms: u64,
}

impl SensorSummary {
    /// 任一前向通道为障碍
    pub fn front_obstacle(&self) -> bool {
        self.obstacle_left || self.obstacle_mid || self.obstacle_right
    }
}

/// 机器人共享状态（温数据，RwLock 保护）
#[derive(Debug, Clone)]
pub struct RobotState {
    pub drive_mode: DriveMode,
    pub last_route_start: String,
    pub last_route_end: String,
    pub position: String,
    /// 用户可见的健康状态字符串（"OK" / "WiFi Error" 等），
    /// 故障以字符串形式进入遥测，不以崩溃形式出现
    pub system_health: String,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            drive_mode: DriveMode::Idle,
            last_route_start: String::new(),
            last_route_end: String::new(),
            position: "Home".to_string(),
            system_health: "OK".to_string(),
        }
    }
}

impl RobotState {
    /// 后端侧模式字符串
    ///
    /// AUTO 模式下纯靠 position == "MOVING" 推断 "NAVIGATING"（占位启发式）。
    pub fn backend_mode(&self) -> &'static str {
        match self.drive_mode {
            DriveMode::Manual => "MANUAL",
            DriveMode::Auto => {
                if self.position == "MOVING" {
                    "NAVIGATING"
                } else {
                    "IDLE"
                }
            },
            DriveMode::Idle => "IDLE",
        }
    }

    pub fn ensure_home_if_empty(&mut self) {
        if self.position.is_empty() {
            self.position = "Home".to_string();
        }
    }
}

/// 机器人上下文（所有共享状态的聚合）
pub struct RobotContext {
    /// 温数据：模式、路线、位置、健康状态
    pub robot: RwLock<RobotState>,
    /// 热数据：传感器汇总，sensor 任务整体发布
    pub sensors: ArcSwap<SensorSummary>,
    /// 音量镜像（f32 位模式），音频任务单写、遥测多读
    audio_volume_bits: AtomicU32,
}

impl RobotContext {
    pub fn new() -> Self {
        Self {
            robot: RwLock::new(RobotState::default()),
            sensors: ArcSwap::from_pointee(SensorSummary::default()),
            audio_volume_bits: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// 当前驱动模式（短读锁）
    pub fn drive_mode(&self) -> DriveMode {
        self.robot.read().drive_mode
    }

    /// 发布新的传感器汇总
    pub fn publish_sensors(&self, summary: SensorSummary) {
        self.sensors.store(Arc::new(summary));
    }

    /// 音量镜像写入（仅音频任务调用；陈旧读取无安全影响）
    pub fn set_audio_volume(&self, volume: f32) {
        self.audio_volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    /// 音量镜像读取
    pub fn audio_volume(&self) -> f32 {
        f32::from_bits(self.audio_volume_bits.load(Ordering::Relaxed))
    }
}

impl Default for RobotContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 遥测状态快照（扁平拷贝）
///
/// 在短临界区内拷出全部字段；之后的序列化（任意线格式，协作方负责）
/// 在无锁状态下进行。
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub system_health: String,
    /// 电池电量占位值（遥测精度为非目标）
    pub battery_level: u8,
    pub drive_mode: DriveMode,
    /// 后端侧模式字符串（含 NAVIGATING 启发式）
    pub backend_mode: &'static str,
    /// 货仓状态占位值
    pub cargo_status: &'static str,
    pub position: String,
    pub last_route_start: String,
    pub last_route_end: String,
    pub obstacle_left: bool,
    pub obstacle_mid: bool,
    pub obstacle_right: bool,
    pub lux: Option<f32>,
    pub audio_volume: f32,
    pub sensors_updated_at_ms: u64,
}

impl StatusSnapshot {
    /// 采集一份快照
    pub fn capture(ctx: &RobotContext) -> Self {
        // 温数据：一次读锁内整体拷出
        let robot = ctx.robot.read().clone();
        // 热数据：无锁 load
        let sensors = ctx.sensors.load_full();

        Self {
            backend_mode: robot.backend_mode(),
            system_health: robot.system_health,
            battery_level: 85,
            drive_mode: robot.drive_mode,
            cargo_status: "EMPTY",
            position: robot.position,
            last_route_start: robot.last_route_start,
            last_route_end: robot.last_route_end,
            obstacle_left: sensors.obstacle_left,
            obstacle_mid: sensors.obstacle_mid,
            obstacle_right: sensors.obstacle_right,
            lux: sensors.lux,
            audio_volume: ctx.audio_volume(),
            sensors_updated_at_ms: sensors.updated_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_mode_round_trip() {
        for mode in [DriveMode::Idle, DriveMode::Manual, DriveMode::Auto] {
            assert_eq!(DriveMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(DriveMode::parse("TURBO"), None);
    }

    #[test]
    fn test_robot_state_default() {
        let state = RobotState::default();
        assert_eq!(state.drive_mode, DriveMode::Idle);
        assert_eq!(state.position, "Home");
        assert_eq!(state.system_health, "OK");
        assert!(state.last_route_start.is_empty());
    }

    #[test]
    fn test_backend_mode_heuristic() {
        let mut state = RobotState::default();
        assert_eq!(state.backend_mode(), "IDLE");

        state.drive_mode = DriveMode::Manual;
        assert_eq!(state.backend_mode(), "MANUAL");

        state.drive_mode = DriveMode::Auto;
        assert_eq!(state.backend_mode(), "IDLE");
        state.position = "MOVING".to_string();
        assert_eq!(state.backend_mode(), "NAVIGATING");
    }

    #[test]
    fn test_ensure_home_if_empty() {
        let mut state = RobotState::default();
        state.position.clear();
        state.ensure_home_if_empty();
        assert_eq!(state.position, "Home");

        state.position = "MOVING".to_string();
        state.ensure_home_if_empty();
        assert_eq!(state.position, "MOVING");
    }

    #[test]
    fn test_snapshot_copies_all_fields() {
        let ctx = RobotContext::new();
        {
            let mut robot = ctx.robot.write();
            robot.drive_mode = DriveMode::Auto;
            robot.position = "MOVING".to_string();
            robot.last_route_start = "A".to_string();
            robot.last_route_end = "B".to_string();
        }
        ctx.publish_sensors(SensorSummary {
            obstacle_left: false,
            obstacle_mid: true,
            obstacle_right: false,
            lux: Some(12.5),
            updated_at_ms: 777,
        });
        ctx.set_audio_volume(0.2);

        let snap = StatusSnapshot::capture(&ctx);
        assert_eq!(snap.drive_mode, DriveMode::Auto);
        assert_eq!(snap.backend_mode, "NAVIGATING");
        assert_eq!(snap.position, "MOVING");
        assert_eq!(snap.last_route_start, "A");
        assert_eq!(snap.last_route_end, "B");
        assert!(snap.obstacle_mid);
        assert_eq!(snap.lux, Some(12.5));
        assert_eq!(snap.audio_volume, 0.2);
        assert_eq!(snap.sensors_updated_at_ms, 777);
        assert_eq!(snap.battery_level, 85);
        assert_eq!(snap.cargo_status, "EMPTY");
    }

    #[test]
    fn test_audio_volume_mirror() {
        let ctx = RobotContext::new();
        assert_eq!(ctx.audio_volume(), 0.0);
        ctx.set_audio_volume(0.75);
        assert_eq!(ctx.audio_volume(), 0.75);
    }
}
