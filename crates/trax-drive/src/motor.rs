//! 电机驱动模块
//!
//! 封装 Waveshare 电机扩展板的双路 TB6612 驱动：每侧一个 PWM 通道控制
//! 占空比，两个电平通道控制方向。`tank()` 在单个临界区内成对下发左右
//! 两侧，保证并发调用时不会出现"一侧新、一侧旧"的混合状态。

use crate::error::DriveError;
use std::sync::Mutex;
use tracing::trace;
use trax_pwm::PwmBus;

/// 电机死区：幅值低于该阈值按停止处理
pub const SPEED_EPSILON: f64 = 1e-3;

// 扩展板通道映射
const PWMA: u8 = 0;
const AIN1: u8 = 1;
const AIN2: u8 = 2;
const PWMB: u8 = 5;
const BIN1: u8 = 3;
const BIN2: u8 = 4;

/// 电机侧别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// 左侧（A 路）
    Left,
    /// 右侧（B 路）
    Right,
}

impl Side {
    /// 该侧的 (PWM, IN1, IN2) 通道号
    fn channels(self) -> (u8, u8, u8) {
        match self {
            Side::Left => (PWMA, AIN1, AIN2),
            Side::Right => (PWMB, BIN1, BIN2),
        }
    }
}

/// 转动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// 双路电机驱动（对外 API）
///
/// 独占持有 PWM 总线句柄；所有硬件调用经由内部互斥锁序列化。
/// 硬件故障原样上抛为 [`DriveError::Actuation`]，不做静默重试。
#[derive(Debug)]
pub struct MotorDriver<B: PwmBus> {
    /// PWM 总线（互斥锁保护所有 I2C 调用）
    bus: Mutex<B>,
}

impl<B: PwmBus> MotorDriver<B> {
    /// 创建新的电机驱动，接管总线所有权
    pub fn new(bus: B) -> Self {
        Self {
            bus: Mutex::new(bus),
        }
    }

    /// 履带式差速驱动：原子地成对下发左右两侧
    ///
    /// # 参数
    /// - `left` / `right`: `[-1.0, 1.0]`，符号为方向，幅值为速度占比；
    ///   越界值防御性截断，幅值低于死区的一侧直接停止
    ///
    /// # 错误
    /// - `DriveError::Actuation`: 硬件调用失败（故障必须上浮，不能吞掉）
    pub fn tank(&self, left: f64, right: f64) -> Result<(), DriveError> {
        let mut bus = self.bus.lock().map_err(|_| DriveError::PoisonedLock)?;
        Self::apply_side(&mut *bus, Side::Left, left)?;
        Self::apply_side(&mut *bus, Side::Right, right)?;
        trace!("tank applied: left={:.3}, right={:.3}", left, right);
        Ok(())
    }

    /// 单侧运转（持锁版本见 `apply_side`）
    pub fn run_side(
        &self,
        side: Side,
        direction: Direction,
        speed_percent: u8,
    ) -> Result<(), DriveError> {
        let mut bus = self.bus.lock().map_err(|_| DriveError::PoisonedLock)?;
        Self::run_side_locked(&mut *bus, side, direction, speed_percent)
    }

    /// 单侧停止（占空比清零）
    pub fn stop_side(&self, side: Side) -> Result<(), DriveError> {
        let mut bus = self.bus.lock().map_err(|_| DriveError::PoisonedLock)?;
        Self::stop_side_locked(&mut *bus, side)
    }

    /// 带符号速度 → 单侧停止或运转
    fn apply_side(bus: &mut B, side: Side, value: f64) -> Result<(), DriveError> {
        if value.abs() < SPEED_EPSILON {
            return Self::stop_side_locked(bus, side);
        }
        let value = value.clamp(-1.0, 1.0);
        let speed = (value.abs() * 100.0).round() as u8;
        let direction = if value > 0.0 {
            Direction::Forward
        } else {
            Direction::Backward
        };
        Self::run_side_locked(bus, side, direction, speed)
    }

    fn run_side_locked(
        bus: &mut B,
        side: Side,
        direction: Direction,
        speed_percent: u8,
    ) -> Result<(), DriveError> {
        let (pwm, in1, in2) = side.channels();
        bus.set_duty_cycle(pwm, speed_percent.min(100))?;
        match direction {
            Direction::Forward => {
                bus.set_level(in1, false)?;
                bus.set_level(in2, true)?;
            },
            Direction::Backward => {
                bus.set_level(in1, true)?;
                bus.set_level(in2, false)?;
            },
        }
        Ok(())
    }

    fn stop_side_locked(bus: &mut B, side: Side) -> Result<(), DriveError> {
        let (pwm, _, _) = side.channels();
        bus.set_duty_cycle(pwm, 0)?;
        Ok(())
    }
}
