//! 数字传感器去抖与传感器组
//!
//! 阈值附近的单次采样不可信：候选状态必须持续一个去抖窗口才被采纳，
//! 每条边沿恰好上报一次（one-shot）。

use crate::config::SensorConfig;
use crate::hal::{DigitalInput, LuxSensor};
use crate::state::SensorSummary;
use tracing::debug;

/// 去抖数字输入
///
/// 包装一路 [`DigitalInput`]，按固定极性规则映射为逻辑状态，
/// 经迟滞去抖后输出稳定值和一次性的 rose/fell 边沿标志。
///
/// # Example
///
/// ```
/// use teletable_core::sensor::DebouncedInput;
/// use teletable_core::hal::DigitalInput;
///
/// struct AlwaysLow;
/// impl DigitalInput for AlwaysLow {
///     fn read_raw(&mut self) -> bool { false }
/// }
///
/// // active-low：引脚拉低表示障碍
/// let mut input = DebouncedInput::new(AlwaysLow, true, 30, 0);
/// assert!(input.is_active());
/// ```
pub struct DebouncedInput<I: DigitalInput> {
    input: I,
    /// 低电平有效（障碍时引脚为 LOW）
    active_low: bool,
    /// 去抖窗口（毫秒）
    debounce_ms: u64,

    stable: bool,
    pending: bool,
    last_change_ms: u64,

    rose: bool,
    fell: bool,
}

impl<I: DigitalInput> DebouncedInput<I> {
    /// 创建并以当前原始电平初始化稳定状态（不产生边沿事件）
    pub fn new(mut input: I, active_low: bool, debounce_ms: u64, now_ms: u64) -> Self {
        let raw = input.read_raw();
        let stable = Self::map_polarity(raw, active_low);
        Self {
            input,
            active_low,
            debounce_ms,
            stable,
            pending: stable,
            last_change_ms: now_ms,
            rose: false,
            fell: false,
        }
    }

    /// 采样并推进去抖状态机
    ///
    /// 候选值变化会重置 pending 和变化时间戳；pending 持续 ≥ 去抖窗口
    /// 后稳定值才翻转，翻转时恰好置起一个 rose 或 fell 标志。
    pub fn update(&mut self, now_ms: u64) {
        let raw = self.input.read_raw();
        let candidate = Self::map_polarity(raw, self.active_low);

        if candidate != self.pending {
            self.pending = candidate;
            self.last_change_ms = now_ms;
        }

        if self.pending != self.stable
            && now_ms.wrapping_sub(self.last_change_ms) >= self.debounce_ms
        {
            let last_stable = self.stable;
            self.stable = self.pending;

            if !last_stable && self.stable {
                self.rose = true;
            }
            if last_stable && !self.stable {
                self.fell = true;
            }
        }
    }

    /// 当前去抖后的稳定状态
    pub fn is_active(&self) -> bool {
        self.stable
    }

    /// 上升沿一次性读取（读取即消费）
    pub fn rose(&mut self) -> bool {
        std::mem::take(&mut self.rose)
    }

    /// 下降沿一次性读取（读取即消费）
    pub fn fell(&mut self) -> bool {
        std::mem::take(&mut self.fell)
    }

    fn map_polarity(raw: bool, active_low: bool) -> bool {
        // raw=true 表示引脚 HIGH；active-low 时 LOW 才是有效（障碍）
        if active_low { !raw } else { raw }
    }
}

/// 传感器组：三路前向 IR 避障 + 环境光
///
/// 由 sensor 任务独占持有；去抖后的汇总通过
/// [`SensorSummary`] 发布给驱动回路和遥测（无锁读取，见 `RobotContext`）。
pub struct SensorSuite<D: DigitalInput, L: LuxSensor> {
    ir_left: DebouncedInput<D>,
    ir_mid: DebouncedInput<D>,
    ir_right: DebouncedInput<D>,

    lux_sensor: L,
    lux: Option<f32>,
    lux_sample_period_ms: u64,
    last_lux_sample_ms: u64,
}

impl<D: DigitalInput, L: LuxSensor> SensorSuite<D, L> {
    pub fn new(cfg: &SensorConfig, left: D, mid: D, right: D, lux: L, now_ms: u64) -> Self {
        Self {
            ir_left: DebouncedInput::new(left, cfg.ir_active_low, cfg.debounce_ms, now_ms),
            ir_mid: DebouncedInput::new(mid, cfg.ir_active_low, cfg.debounce_ms, now_ms),
            ir_right: DebouncedInput::new(right, cfg.ir_active_low, cfg.debounce_ms, now_ms),
            lux_sensor: lux,
            lux: None,
            lux_sample_period_ms: cfg.lux_sample_period_ms,
            last_lux_sample_ms: 0,
        }
    }

    /// 推进全部通道并记录边沿日志
    pub fn update(&mut self, now_ms: u64) {
        self.ir_left.update(now_ms);
        self.ir_mid.update(now_ms);
        self.ir_right.update(now_ms);

        if self.ir_left.rose() {
            debug!("ir left: obstacle");
        }
        if self.ir_left.fell() {
            debug!("ir left: clear");
        }
        if self.ir_mid.rose() {
            debug!("ir middle: obstacle");
        }
        if self.ir_mid.fell() {
            debug!("ir middle: clear");
        }
        if self.ir_right.rose() {
            debug!("ir right: obstacle");
        }
        if self.ir_right.fell() {
            debug!("ir right: clear");
        }

        // 光照按自己的周期采样；读取失败表现为 None（跳过该输入）
        if now_ms.wrapping_sub(self.last_lux_sample_ms) >= self.lux_sample_period_ms {
            self.last_lux_sample_ms = now_ms;
            self.lux = self.lux_sensor.read_lux();
        }
    }

    /// 任一前向通道稳定为障碍
    pub fn front_obstacle_now(&self) -> bool {
        self.ir_left.is_active() || self.ir_mid.is_active() || self.ir_right.is_active()
    }

    /// 当前汇总（发布到共享状态用）
    pub fn summary(&self, now_ms: u64) -> SensorSummary {
        SensorSummary {
            obstacle_left: self.ir_left.is_active(),
            obstacle_mid: self.ir_mid.is_active(),
            obstacle_right: self.ir_right.is_active(),
            lux: self.lux,
            updated_at_ms: now_ms,
        }
    }
}
