//! # 固件配置
//!
//! 控制核心的全部可调参数。默认值沿用实测标定过的出厂参数，
//! 支持从 TOML 文件加载/保存。

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 驱动回路配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// 油门死区（输入幅值低于此值输出强制为 0）
    pub throttle_deadband: f32,
    /// 转向死区
    pub steer_deadband: f32,
    /// 油门转换速率上限（单位幅值/秒）
    pub throttle_slew_rate: f32,
    /// 转向转换速率上限（单位幅值/秒）
    pub steer_slew_rate: f32,
    /// MANUAL 模式命令超时（毫秒）：超时后目标衰减为零（软死人开关）
    pub manual_cmd_timeout_ms: u64,
    /// 电机最小重新应用间隔（毫秒）
    pub motor_apply_min_interval_ms: u64,
    /// 电机应用变化阈值：双侧占空比变化都小于此值且未到间隔时跳过写入
    pub apply_epsilon: f32,
    /// 障碍保持时长（毫秒）：传感器转清后前向闭锁继续保持的最小驻留
    pub obstacle_hold_ms: u64,
    /// 单 tick dt 钳制上限（毫秒），限制调度停顿造成的单步跳变
    pub dt_max_ms: u64,
    /// 混合后按最大幅值重归一化（保持转向比例，而不是裁剪偏置）
    pub renormalize_mixing: bool,
    /// 驱动调试打印
    pub drive_debug: bool,
    /// 驱动调试打印节流间隔（毫秒）
    pub drive_debug_interval_ms: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            throttle_deadband: 0.03,
            steer_deadband: 0.03,
            throttle_slew_rate: 2.8,
            steer_slew_rate: 4.5,
            manual_cmd_timeout_ms: 600,
            motor_apply_min_interval_ms: 15,
            apply_epsilon: 0.005,
            obstacle_hold_ms: 300,
            dt_max_ms: 100,
            renormalize_mixing: true,
            drive_debug: false,
            drive_debug_interval_ms: 250,
        }
    }
}

/// 传感器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// 去抖窗口（毫秒）：候选状态必须持续这么久才被采纳
    pub debounce_ms: u64,
    /// IR 传感器低电平有效（障碍时引脚拉低）
    pub ir_active_low: bool,
    /// 光照采样周期（毫秒）
    pub lux_sample_period_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 30,
            ir_active_low: true,
            lux_sample_period_ms: 250,
        }
    }
}

/// 音频配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// 采样率（Hz）
    pub sample_rate_hz: u32,
    /// 单次渲染块大小（采样数）
    pub chunk_samples: usize,
    /// 命令队列容量（有界，producer 侧 try_send）
    pub queue_capacity: usize,
    /// 默认音量 [0, 1]
    pub default_volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 22050,
            chunk_samples: 256,
            queue_capacity: 8,
            default_volume: 0.20,
        }
    }
}

/// 运行时任务周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// 驱动 tick 周期（毫秒）
    pub drive_tick_ms: u64,
    /// 传感器采样周期（毫秒）
    pub sensor_tick_ms: u64,
    /// 后端状态推送周期（毫秒）
    pub backend_push_ms: u64,
    /// 状态日志行节流间隔（毫秒）
    pub status_log_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            drive_tick_ms: 20,
            sensor_tick_ms: 50,
            backend_push_ms: 1000,
            status_log_ms: 2000,
        }
    }
}

/// 固件配置聚合
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    pub drive: DriveConfig,
    pub sensor: SensorConfig,
    pub audio: AudioConfig,
    pub runtime: RuntimeConfig,
}

impl FirmwareConfig {
    /// 从 TOML 文件加载配置
    ///
    /// 缺失的字段取默认值（`#[serde(default)]`）。
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let content = fs::read_to_string(path)?;
        let config: FirmwareConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CoreError> {
        // 序列化自身的配置结构不会失败，失败即为逻辑错误
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoreError::Backend(format!("config serialize: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_config_default() {
        let cfg = DriveConfig::default();
        assert_eq!(cfg.throttle_deadband, 0.03);
        assert_eq!(cfg.steer_deadband, 0.03);
        assert_eq!(cfg.throttle_slew_rate, 2.8);
        assert_eq!(cfg.steer_slew_rate, 4.5);
        assert_eq!(cfg.manual_cmd_timeout_ms, 600);
        assert_eq!(cfg.motor_apply_min_interval_ms, 15);
        assert_eq!(cfg.obstacle_hold_ms, 300);
        assert_eq!(cfg.dt_max_ms, 100);
        assert!(cfg.renormalize_mixing);
        assert!(!cfg.drive_debug);
    }

    #[test]
    fn test_sensor_config_default() {
        let cfg = SensorConfig::default();
        assert_eq!(cfg.debounce_ms, 30);
        assert!(cfg.ir_active_low);
        assert_eq!(cfg.lux_sample_period_ms, 250);
    }

    #[test]
    fn test_audio_config_default() {
        let cfg = AudioConfig::default();
        assert_eq!(cfg.sample_rate_hz, 22050);
        assert_eq!(cfg.chunk_samples, 256);
        assert_eq!(cfg.default_volume, 0.20);
    }

    #[test]
    fn test_parse_partial_toml() {
        // section 内只覆盖部分字段：未覆盖的字段取默认值
        let toml_str = r#"
            [drive]
            throttle_deadband = 0.05
            manual_cmd_timeout_ms = 800

            [audio]
            default_volume = 0.5
        "#;
        let config: FirmwareConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.drive.throttle_deadband, 0.05);
        assert_eq!(config.drive.manual_cmd_timeout_ms, 800);
        // 同一 section 内缺失的字段取默认值
        assert_eq!(config.drive.throttle_slew_rate, 2.8);
        assert_eq!(config.drive.obstacle_hold_ms, 300);
        assert_eq!(config.audio.default_volume, 0.5);
        assert_eq!(config.audio.sample_rate_hz, 22050);
        // 未覆盖的 section 取默认值
        assert_eq!(config.sensor.debounce_ms, 30);
        assert_eq!(config.runtime.drive_tick_ms, 20);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = FirmwareConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: FirmwareConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.drive.throttle_slew_rate, config.drive.throttle_slew_rate);
        assert_eq!(parsed.audio.sample_rate_hz, config.audio.sample_rate_hz);
        assert_eq!(parsed.runtime.backend_push_ms, config.runtime.backend_push_ms);
    }

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config: FirmwareConfig = toml::from_str("").unwrap();
        assert_eq!(config.drive.obstacle_hold_ms, 300);
        assert_eq!(config.audio.queue_capacity, 8);
    }
}
