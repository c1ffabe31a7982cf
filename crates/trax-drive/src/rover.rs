//! Rover 门面模块
//!
//! 把电机驱动、调度器和状态存储拼装成一个对象，供请求处理层直接
//! 调用。控制流：请求 → 命令解释（纯函数）→ 调度器（副作用）→
//! 状态存储更新——状态更新与驱动是否仍在运行无关。

use crate::command::{DirectionFlags, DriveCommand};
use crate::config::DriveConfig;
use crate::error::DriveError;
use crate::motor::MotorDriver;
use crate::scheduler::{DriveScheduler, SchedulerState};
use crate::state::{RobotState, StateStore, StateUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use trax_pwm::PwmBus;

/// 一次控制请求（边界层反序列化后传入）
///
/// 字段缺省值与线上协议一致：速度 0.6，时长 0.8 秒。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlRequest {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub command: Option<String>,
    pub speed: f64,
    pub duration: f64,
}

impl Default for ControlRequest {
    fn default() -> Self {
        Self {
            up: false,
            down: false,
            left: false,
            right: false,
            command: None,
            speed: 0.6,
            duration: 0.8,
        }
    }
}

/// Rover 门面（对外 API）
///
/// 进程内只创建一个实例，被所有请求处理方共享（`&self` 即可调用
/// 全部操作）。
pub struct Rover<B: PwmBus + Send + 'static> {
    scheduler: DriveScheduler<B>,
    store: StateStore,
    config: DriveConfig,
}

impl<B: PwmBus + Send + 'static> Rover<B> {
    /// 用给定总线和配置组装 Rover
    pub fn new(bus: B, config: DriveConfig) -> Self {
        let motor = Arc::new(MotorDriver::new(bus));
        let scheduler = DriveScheduler::with_poll_interval(motor, config.poll_interval());
        let store = StateStore::open(&config.state_path);
        Self {
            scheduler,
            store,
            config,
        }
    }

    /// 处理一次控制请求
    ///
    /// 解释命令并启动（或立即停止）驱动，然后更新并返回状态快照。
    /// 非有限的速度/时长被拒绝；有限但越界的值被截断。
    ///
    /// # 错误
    /// - `DriveError::InvalidInput`: 速度或时长为 NaN/无穷
    /// - `DriveError::Actuation`: 同步路径上的硬件故障
    pub fn apply(&self, request: ControlRequest) -> Result<RobotState, DriveError> {
        if !request.speed.is_finite() {
            return Err(DriveError::InvalidInput(format!(
                "speed must be finite, got {}",
                request.speed
            )));
        }
        if !request.duration.is_finite() {
            return Err(DriveError::InvalidInput(format!(
                "duration must be finite, got {}",
                request.duration
            )));
        }

        let speed = request.speed.clamp(0.0, 1.0);
        let duration = self.config.clamp_duration(request.duration);
        let flags = DirectionFlags {
            up: request.up,
            down: request.down,
            left: request.left,
            right: request.right,
        };
        let command = DriveCommand::resolve(request.command.as_deref(), flags);
        let vector = command.to_vector(speed);
        debug!(
            "control request resolved: command={}, vector=({:.2}, {:.2}), duration={:.2}s",
            command.as_str(),
            vector.left,
            vector.right,
            duration
        );

        // 零向量在 launch 内部退化为立即停止
        self.scheduler.launch(vector, duration)?;

        self.store.update(StateUpdate {
            up: Some(request.up),
            down: Some(request.down),
            left: Some(request.left),
            right: Some(request.right),
            command: Some(command),
            speed: Some(speed),
            duration: Some(duration),
        })
    }

    /// 立即停车：取消在途驱动，同步下发双侧停止，状态置为 stop
    pub fn halt(&self) -> Result<RobotState, DriveError> {
        self.scheduler.stop()?;
        self.store.update(StateUpdate::command(DriveCommand::Stop))
    }

    /// 读取当前状态快照
    pub fn status(&self) -> Result<RobotState, DriveError> {
        self.store.read()
    }

    /// 当前调度器状态
    pub fn drive_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// 进程退出前的收尾：取消并 join 在途驱动任务，最后停车
    pub fn shutdown(&self) -> Result<(), DriveError> {
        self.scheduler.shutdown()
    }

    /// 调度器句柄（高级用法/测试）
    pub fn scheduler(&self) -> &DriveScheduler<B> {
        &self.scheduler
    }

    /// 状态存储句柄（高级用法/测试）
    pub fn store(&self) -> &StateStore {
        &self.store
    }
}
