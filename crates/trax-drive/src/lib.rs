//! 驱动核心模块
//!
//! 本模块提供 trax 履带底盘的驱动核心，包括：
//! - 电机驱动（左右两侧成对下发，单临界区）
//! - 命令解释（方向指令 → 左右轮速度向量，纯函数）
//! - 定时驱动调度（至多一个活动驱动任务，可抢占、可取消）
//! - 状态存储（原子快照读写 + 崩溃一致的落盘）
//!
//! # 使用场景
//!
//! 请求处理层（HTTP 等）只需要持有一个 [`Rover`] 实例：
//! `apply()` 处理方向指令，`halt()` 立即停车，`status()` 读取快照。

pub mod command;
pub mod config;
mod error;
pub mod motor;
pub mod rover;
pub mod scheduler;
pub mod state;

pub use command::{DirectionFlags, DriveCommand, TankVector, interpret};
pub use config::DriveConfig;
pub use error::DriveError;
pub use motor::{Direction, MotorDriver, Side, SPEED_EPSILON};
pub use rover::{ControlRequest, Rover};
pub use scheduler::{AtomicSchedulerState, DriveScheduler, SchedulerState};
pub use state::{RobotState, StateStore, StateUpdate};
