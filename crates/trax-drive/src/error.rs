//! 驱动层错误类型定义

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use trax_pwm::PwmError;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriveError {
    /// PWM 执行器错误（硬件故障，不自动重试）
    #[error("Actuation error: {0}")]
    Actuation(#[from] PwmError),

    /// 状态落盘失败（非致命，内存状态仍然有效）
    #[error("State persistence failed at {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 快照序列化失败
    #[error("Snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// 配置文件读取错误
    #[error("Config IO error: {0}")]
    Io(#[from] io::Error),

    /// 配置解析错误
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// 配置序列化错误
    #[error("Config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    /// 非法请求（边界层应已拦截，这里兜底）
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,

    /// 驱动任务线程错误
    #[error("Drive task error: {0}")]
    Task(String),
}

impl DriveError {
    /// 是否为致命错误（设备不可达）
    ///
    /// 每次下发都失败且 `is_fatal()` 为 true 时，控制进程应当退出。
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriveError::Actuation(e) if e.is_fatal())
    }
}
