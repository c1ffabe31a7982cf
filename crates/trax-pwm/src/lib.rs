//! # Trax PWM Adapter Layer
//!
//! PWM 硬件抽象层，提供统一的 PWM 控制器接口抽象。
//!
//! 电机驱动层只依赖 [`PwmBus`] trait，不关心具体控制器型号；
//! 目前提供 Waveshare 电机扩展板使用的 PCA9685 后端（仅 Linux）。

use thiserror::Error;

#[cfg(target_os = "linux")]
pub mod pca9685;

#[cfg(target_os = "linux")]
pub use pca9685::Pca9685;

/// PCA9685 等 16 通道控制器的通道数上限
pub const CHANNEL_COUNT: u8 = 16;

/// PWM 适配层统一错误类型
#[derive(Error, Debug)]
pub enum PwmError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] PwmDeviceError),
    #[error("Invalid PWM channel: {0}")]
    InvalidChannel(u8),
    #[error("Device not started")]
    NotStarted,
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    InvalidResponse,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct PwmDeviceError {
    pub kind: PwmDeviceErrorKind,
    pub message: String,
}

impl PwmDeviceError {
    pub fn new(kind: PwmDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 是否为致命错误（设备不可达，重试无意义）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            PwmDeviceErrorKind::NoDevice
                | PwmDeviceErrorKind::AccessDenied
                | PwmDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for PwmDeviceError {
    fn from(message: String) -> Self {
        Self::new(PwmDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for PwmDeviceError {
    fn from(message: &str) -> Self {
        Self::new(PwmDeviceErrorKind::Unknown, message)
    }
}

impl PwmError {
    /// 是否为致命错误
    ///
    /// 致命错误表示设备不可达（拔线、权限丢失），调用方应停止重试并上报。
    pub fn is_fatal(&self) -> bool {
        match self {
            PwmError::Device(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// PWM 控制器抽象
///
/// 所有方法都是同步的，调用返回即表示寄存器写入完成（或失败）。
/// 实现者负责通道范围检查，越界返回 [`PwmError::InvalidChannel`]。
pub trait PwmBus {
    /// 设置通道占空比，`percent` 取值 0-100，越界截断到 100
    fn set_duty_cycle(&mut self, channel: u8, percent: u8) -> Result<(), PwmError>;

    /// 将通道设为恒定电平（true = 全高，false = 全低）
    fn set_level(&mut self, channel: u8, high: bool) -> Result<(), PwmError>;
}
