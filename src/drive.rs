//! 差速驱动闭环
//!
//! 把指令的 (油门, 转向) 对转换为限速、去死区、坦克混合、
//! 安全覆盖后的电机占空比。每 tick 的处理顺序是承载安全不变量的：
//! 障碍重估 → 目标/平滑值钳制 → 转换速率推进 → 二次钳制 → 混合输出。
//!
//! 所有命令源（控制台、遥控通道、模式处理器）都写同一组入口
//! （`set_targets` / `stop`），最后写入者获胜；陈旧命令只由回路内的
//! MANUAL 超时治理（软衰减，不是硬切断）。

use crate::config::DriveConfig;
use crate::hal::{MotorDriver, MotorSide};
use crate::state::DriveMode;
use tracing::{debug, info};

/// 向目标推进，单步不超过 `max_step`
fn slew_towards(current: f32, target: f32, max_step: f32) -> f32 {
    let delta = target - current;
    if delta.abs() <= max_step {
        target
    } else if delta > 0.0 {
        current + max_step
    } else {
        current - max_step
    }
}

fn approx_equal(a: f32, b: f32, eps: f32) -> bool {
    (a - b).abs() <= eps
}

/// 非有限输入归零、其余钳制到 [-1, 1]（无效数值钳制，不拒绝）
fn sanitize(v: f32) -> f32 {
    if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 }
}

/// 驱动控制器
///
/// 由 drive 任务独占持有内部状态；如需从其他任务调用（命令处理在网络
/// 线程上执行），必须通过与共享状态相同的锁纪律（`Arc<Mutex<_>>`）访问。
///
/// # Example
///
/// ```
/// use teletable_core::config::DriveConfig;
/// use teletable_core::drive::DriveController;
/// use teletable_core::hal::{MotorDriver, MotorSide};
/// use teletable_core::state::DriveMode;
///
/// struct NullMotor;
/// impl MotorDriver for NullMotor {
///     fn set_duty(&mut self, _side: MotorSide, _duty: f32) {}
/// }
///
/// let mut drive = DriveController::new(DriveConfig::default(), NullMotor, 0);
/// drive.set_targets(0.5, 0.0, false, 0);
/// drive.update(20, DriveMode::Manual, false);
/// ```
pub struct DriveController<M: MotorDriver> {
    cfg: DriveConfig,
    motor: M,

    target_throttle: f32,
    target_steer: f32,
    smoothed_throttle: f32,
    smoothed_steer: f32,

    /// 最近一次目标刷新时间（MANUAL 超时的基准）
    last_cmd_ms: u64,
    last_update_ms: u64,

    last_apply_ms: u64,
    last_applied_left: f32,
    last_applied_right: f32,

    last_debug_ms: u64,

    /// 前向障碍闭锁（含清除后的保持驻留）
    obstacle_active: bool,
    hold_until_ms: u64,
}

impl<M: MotorDriver> DriveController<M> {
    pub fn new(cfg: DriveConfig, motor: M, boot_ms: u64) -> Self {
        Self {
            cfg,
            motor,
            target_throttle: 0.0,
            target_steer: 0.0,
            smoothed_throttle: 0.0,
            smoothed_steer: 0.0,
            last_cmd_ms: boot_ms,
            last_update_ms: boot_ms,
            last_apply_ms: boot_ms,
            last_applied_left: 0.0,
            last_applied_right: 0.0,
            last_debug_ms: boot_ms,
            obstacle_active: false,
            hold_until_ms: 0,
        }
    }

    /// 写入新的速度目标并刷新时间戳
    ///
    /// `immediate` 完全绕过转换速率限制（操作员 STOP、模式→IDLE 用，
    /// 即时响应是安全相关的）。无错误返回；越界输入静默钳制。
    pub fn set_targets(&mut self, throttle: f32, steer: f32, immediate: bool, now_ms: u64) {
        self.target_throttle = sanitize(throttle);
        self.target_steer = sanitize(steer);
        self.last_cmd_ms = now_ms;

        if immediate {
            self.smoothed_throttle = self.target_throttle;
            self.smoothed_steer = self.target_steer;
            self.apply_tank(self.smoothed_throttle, self.smoothed_steer, now_ms);
        }
    }

    /// 立即停止（绕过转换速率）
    pub fn stop(&mut self, now_ms: u64) {
        self.set_targets(0.0, 0.0, true, now_ms);
    }

    /// 单次控制 tick
    ///
    /// `obstacle_now` 为全部前向传感器去抖稳定值的 OR。
    /// tick 内顺序（障碍重估 → 转换推进 → 占空比计算）承载前向封锁的即时性，不可调换。
    pub fn update(&mut self, now_ms: u64, mode: DriveMode, obstacle_now: bool) {
        // 1. dt 计算并钳制（调度停顿退化为钳制后的小步，不是单步大跳）
        let dt_ms = now_ms.saturating_sub(self.last_update_ms).min(self.cfg.dt_max_ms);
        self.last_update_ms = now_ms;
        let dt = dt_ms as f32 * 0.001;

        // 2. 障碍闭锁：新障碍武装保持驻留；只有传感器清除且驻留期满才释放
        if obstacle_now {
            self.hold_until_ms = now_ms + self.cfg.obstacle_hold_ms;
            if !self.obstacle_active {
                info!("obstacle FRONT detected -> forward blocked");
            }
            self.obstacle_active = true;
        } else if self.obstacle_active && now_ms >= self.hold_until_ms {
            self.obstacle_active = false;
            info!("obstacle FRONT cleared -> forward allowed");
        }

        // 3. MANUAL 模式软死人开关：目标归零（衰减经由转换速率，不是硬切）
        if mode == DriveMode::Manual
            && now_ms.saturating_sub(self.last_cmd_ms) > self.cfg.manual_cmd_timeout_ms
        {
            self.target_throttle = 0.0;
            self.target_steer = 0.0;
        }

        // 4. 障碍期间钳制正向分量（目标和已平滑值都钳）；倒车不受影响
        if self.obstacle_active {
            if self.target_throttle > 0.0 {
                self.target_throttle = 0.0;
            }
            if self.smoothed_throttle > 0.0 {
                self.smoothed_throttle = 0.0;
            }
        }

        // 5. 转换速率推进（油门/转向独立速率）
        let max_throttle_step = self.cfg.throttle_slew_rate * dt;
        let max_steer_step = self.cfg.steer_slew_rate * dt;
        self.smoothed_throttle =
            slew_towards(self.smoothed_throttle, self.target_throttle, max_throttle_step);
        self.smoothed_steer = slew_towards(self.smoothed_steer, self.target_steer, max_steer_step);

        // 6. 二次钳制：覆盖步骤 4-5 之间目标被并发改写的情况
        if self.obstacle_active && self.smoothed_throttle > 0.0 {
            self.smoothed_throttle = 0.0;
        }

        self.apply_tank(self.smoothed_throttle, self.smoothed_steer, now_ms);
    }

    /// 死区 → 坦克混合 → 重归一化 → 限频写入
    fn apply_tank(&mut self, throttle: f32, steer: f32, now_ms: u64) {
        let mut throttle = throttle.clamp(-1.0, 1.0);
        let mut steer = steer.clamp(-1.0, 1.0);

        if throttle.abs() < self.cfg.throttle_deadband {
            throttle = 0.0;
        }
        if steer.abs() < self.cfg.steer_deadband {
            steer = 0.0;
        }

        let mut left = throttle - steer;
        let mut right = throttle + steer;

        if self.cfg.renormalize_mixing {
            // 按最大幅值整体缩放，保持转向比例，而不是裁剪偏置
            let m = left.abs().max(right.abs());
            if m > 1.0 {
                left /= m;
                right /= m;
            }
        }

        let left = left.clamp(-1.0, 1.0);
        let right = right.clamp(-1.0, 1.0);

        // 限频写入：间隔内且双侧变化都在阈值内才跳过 —— 大变化总是绕过
        // 间隔保护（否则可能压掉一次合法的停止）
        let unchanged = approx_equal(left, self.last_applied_left, self.cfg.apply_epsilon)
            && approx_equal(right, self.last_applied_right, self.cfg.apply_epsilon);

        if now_ms.saturating_sub(self.last_apply_ms) < self.cfg.motor_apply_min_interval_ms
            && unchanged
        {
            return;
        }

        // 相同占空比无需重写
        if unchanged {
            return;
        }

        self.motor.set_duty(MotorSide::Left, left);
        self.motor.set_duty(MotorSide::Right, right);

        self.last_applied_left = left;
        self.last_applied_right = right;
        self.last_apply_ms = now_ms;

        if self.cfg.drive_debug
            && now_ms.saturating_sub(self.last_debug_ms) >= self.cfg.drive_debug_interval_ms
        {
            self.last_debug_ms = now_ms;
            debug!(
                "drive tgt(t={:.2} s={:.2}) sm(t={:.2} s={:.2}) -> L={:.2} R={:.2} obs={}",
                self.target_throttle,
                self.target_steer,
                self.smoothed_throttle,
                self.smoothed_steer,
                left,
                right,
                self.obstacle_active
            );
        }
    }

    /// 直接设置左电机（诊断用；绕过整个回路，对障碍闭锁不安全）
    pub fn set_left_direct(&mut self, v: f32) {
        self.motor.set_duty(MotorSide::Left, sanitize(v));
    }

    /// 直接设置右电机（诊断用；绕过整个回路，对障碍闭锁不安全）
    pub fn set_right_direct(&mut self, v: f32) {
        self.motor.set_duty(MotorSide::Right, sanitize(v));
    }

    /// 驱动调试打印开关
    pub fn set_debug(&mut self, on: bool) {
        self.cfg.drive_debug = on;
    }

    /// 前向障碍闭锁当前是否生效（含保持驻留）
    pub fn obstacle_active(&self) -> bool {
        self.obstacle_active
    }

    /// 最近一次实际写入的占空比 (left, right)
    pub fn last_applied(&self) -> (f32, f32) {
        (self.last_applied_left, self.last_applied_right)
    }

    /// 当前平滑值 (throttle, steer)
    pub fn smoothed(&self) -> (f32, f32) {
        (self.smoothed_throttle, self.smoothed_steer)
    }

    /// 当前目标值 (throttle, steer)
    pub fn targets(&self) -> (f32, f32) {
        (self.target_throttle, self.target_steer)
    }
}
