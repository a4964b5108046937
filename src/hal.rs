//! 硬件/协作方抽象层
//!
//! 核心层不直接接触 PWM、I2C、I2S 或网络栈，只通过这组 trait 与协作方交互。
//! 与 CAN 适配层的做法一致：trait 是可 mock 的硬件边界，
//! 测试中用 Mock 适配器替换真实设备。

use crate::error::CoreError;
use crate::state::StatusSnapshot;

/// 电机侧别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorSide {
    Left,
    Right,
}

/// 数字输入通道（IR 避障传感器等）
///
/// `read_raw` 返回引脚原始电平（true = HIGH）。
/// 极性换算（active-low 等）由 [`DebouncedInput`](crate::sensor::DebouncedInput) 负责。
pub trait DigitalInput {
    fn read_raw(&mut self) -> bool;
}

/// 环境光传感器
///
/// 读取失败表现为 `None`（"no reading"），消费方按"跳过该输入"处理，
/// 不作为错误传播。
pub trait LuxSensor {
    fn read_lux(&mut self) -> Option<f32>;
}

/// 电机驱动（H 桥 / PWM 包装，协作方实现）
///
/// `duty` 为带符号占空比，核心层保证已钳制到 [-1, 1]。
pub trait MotorDriver {
    fn set_duty(&mut self, side: MotorSide, duty: f32);
}

/// 音频输出（I2S 包装，协作方实现）
///
/// 写入单声道 16-bit 采样块。实现可以在内部因 DMA 背压而短暂阻塞，
/// 但绝不能反过来阻塞命令发送方（命令走有界队列，见 [`crate::audio`]）。
pub trait AudioSink {
    fn write_samples(&mut self, samples: &[i16]);
}

/// 后端推送协作方
///
/// 重试/退避由协作方自己负责；核心层只在 `is_live()` 为真时调用 `push`，
/// 否则跳过本轮（失败软化，不影响控制回路）。
pub trait BackendSink {
    /// 链路是否可用（未关联/断线时返回 false）
    fn is_live(&self) -> bool;

    /// 推送一份状态快照
    fn push(&mut self, snapshot: &StatusSnapshot) -> Result<(), CoreError>;
}
