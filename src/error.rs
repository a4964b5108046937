//! 核心层错误类型定义

use std::io;
use thiserror::Error;

/// 核心层错误类型
///
/// 控制边界内一律失败软化（clamp / 跳过 / no-op），不跨边界抛错。
/// 唯一承认的致命错误是启动时任务创建失败（`TaskSpawn`）。
#[derive(Error, Debug)]
pub enum CoreError {
    /// IO 错误（配置文件读写）
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// 配置解析错误
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// 任务创建失败（启动期致命错误，通过启动诊断上报）
    #[error("Task spawn failed ({task}): {source}")]
    TaskSpawn {
        /// 任务名称
        task: &'static str,
        /// 底层 IO 错误
        source: io::Error,
    },

    /// 音频命令通道已关闭（音频任务退出）
    #[error("Audio command channel closed")]
    AudioChannelClosed,

    /// 音频命令通道已满
    #[error("Audio command channel full (capacity: {0})")]
    AudioChannelFull(usize),

    /// 后端推送失败（软错误，由推送任务记录日志后继续）
    #[error("Backend push failed: {0}")]
    Backend(String),
}
