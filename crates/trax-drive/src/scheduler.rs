//! 定时驱动调度模块
//!
//! 接受 `(向量, 时长)` 形式的定时驱动请求，保证任意时刻至多一个驱动
//! 任务在持有电机；新请求抢占旧请求（取消后重启，而不是排队）。
//!
//! # 取消机制
//!
//! 取消令牌是一个 `AtomicBool`：调度方置位（arm），运行中的任务只读。
//! 任务以固定间隔（默认 50 ms）轮询令牌，因此抢占延迟的上界约为一个
//! 轮询周期。任务的每一条退出路径都会无条件下发一次双侧停止。
//!
//! # 串行化
//!
//! 持有受监督任务句柄的互斥锁同时充当"启动新驱动"的串行化锁：
//! 置位 → 加锁 → join 旧任务 → 清零 → 启动新任务，全程在同一临界区内，
//! 两个并发 `launch` 不可能都各自清零令牌并各自启动任务。

use crate::command::TankVector;
use crate::error::DriveError;
use crate::motor::MotorDriver;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use trax_pwm::PwmBus;

/// 默认取消轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SchedulerState {
    /// 空闲（没有定时驱动在运行）
    #[default]
    Idle = 0,

    /// 驱动中（一个后台任务正在持有电机）
    Driving = 1,
}

impl SchedulerState {
    /// 从 u8 转换，无效值按 Idle 处理
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Driving,
            _ => Self::Idle,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_driving(self) -> bool {
        self == Self::Driving
    }

    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }
}

/// 调度器状态（原子版本，用于线程间共享）
///
/// 驱动任务在退出时写 Idle，`launch` 在启动前写 Driving；
/// 调用方可以无锁读取。
#[derive(Debug)]
pub struct AtomicSchedulerState {
    inner: AtomicU8,
}

impl AtomicSchedulerState {
    pub fn new(state: SchedulerState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> SchedulerState {
        SchedulerState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: SchedulerState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }
}

impl Default for AtomicSchedulerState {
    fn default() -> Self {
        Self::new(SchedulerState::Idle)
    }
}

/// 定时驱动调度器（对外 API）
///
/// 独占持有取消令牌和"当前运行中的驱动任务"身份。
pub struct DriveScheduler<B: PwmBus + Send + 'static> {
    /// 电机驱动（与调用方共享）
    motor: Arc<MotorDriver<B>>,
    /// 取消令牌：true = 要求运行中的任务停止
    cancel: Arc<AtomicBool>,
    /// 受监督任务句柄；此互斥锁同时是 launch 的串行化锁
    task: Mutex<Option<JoinHandle<()>>>,
    /// 调度器状态（Idle / Driving）
    state: Arc<AtomicSchedulerState>,
    /// 取消轮询间隔
    poll_interval: Duration,
}

impl<B: PwmBus + Send + 'static> DriveScheduler<B> {
    /// 创建调度器，使用默认 50 ms 轮询间隔
    pub fn new(motor: Arc<MotorDriver<B>>) -> Self {
        Self::with_poll_interval(motor, DEFAULT_POLL_INTERVAL)
    }

    /// 创建调度器并指定轮询间隔（测试中常用更短的间隔）
    pub fn with_poll_interval(motor: Arc<MotorDriver<B>>, poll_interval: Duration) -> Self {
        Self {
            motor,
            cancel: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
            state: Arc::new(AtomicSchedulerState::default()),
            poll_interval,
        }
    }

    /// 当前调度器状态
    pub fn state(&self) -> SchedulerState {
        // Acquire: 读到 Idle 时必须能看到任务退出前的全部写入
        self.state.get(Ordering::Acquire)
    }

    pub fn is_driving(&self) -> bool {
        self.state().is_driving()
    }

    /// 启动一次定时驱动：先抢占在途任务，再起新任务，立即返回
    ///
    /// 零向量或非正时长退化为立即停止（不经过后台任务）。
    /// 返回 Ok 只代表任务已接管，不保证调用方能同步观察到执行器动作。
    ///
    /// # 参数
    /// - `vector`: 左右轮速度向量
    /// - `duration`: 持续时长（秒），到期自动停止
    ///
    /// # 错误
    /// - `DriveError::Actuation`: 立即停止路径上的硬件故障
    /// - `DriveError::Task`: 任务线程创建失败
    pub fn launch(&self, vector: TankVector, duration: f64) -> Result<(), DriveError> {
        // 1. 置位取消令牌（幂等，没有任务在跑时也安全）
        // Release: 令牌写入先于后续所有操作对任务可见
        self.cancel.store(true, Ordering::Release);

        if vector.is_zero() || !duration.is_finite() || duration <= 0.0 {
            // Idle → Idle：退化为立即停止
            self.motor.tank(0.0, 0.0)?;
            self.state.set(SchedulerState::Idle, Ordering::Release);
            debug!("launch degraded to immediate stop (zero vector or non-positive duration)");
            return Ok(());
        }

        // 2. 串行化"启动新驱动"：两个并发 launch 不能都清零令牌
        let mut slot = self.task.lock().map_err(|_| DriveError::PoisonedLock)?;

        // join 已被取消的旧任务（至多等待约一个轮询周期），
        // 保证旧任务的收尾停止先于新任务的首次下发
        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                warn!("previous drive task panicked");
            }
        }

        // 3. 为新任务清零令牌
        self.cancel.store(false, Ordering::Release);

        // 4. 启动后台驱动任务
        self.state.set(SchedulerState::Driving, Ordering::Release);
        let motor = self.motor.clone();
        let cancel = self.cancel.clone();
        let state = self.state.clone();
        let poll_interval = self.poll_interval;
        let handle = std::thread::Builder::new()
            .name("trax-drive".to_string())
            .spawn(move || {
                drive_for(motor, vector, duration, cancel, state, poll_interval);
            })
            .map_err(|e| {
                self.state.set(SchedulerState::Idle, Ordering::Release);
                DriveError::Task(format!("failed to spawn drive task: {}", e))
            })?;
        *slot = Some(handle);

        info!(
            "drive launched: left={:.2}, right={:.2}, duration={:.2}s",
            vector.left, vector.right, duration
        );
        // 5. 立即返回，不等待任务完成
        Ok(())
    }

    /// 显式停止：置位取消令牌并同步下发双侧停止
    ///
    /// 不依赖后台任务配合，总是同步、权威地生效。
    pub fn stop(&self) -> Result<(), DriveError> {
        self.cancel.store(true, Ordering::Release);
        self.motor.tank(0.0, 0.0)?;
        self.state.set(SchedulerState::Idle, Ordering::Release);
        info!("drive stopped");
        Ok(())
    }

    /// 进程退出前的收尾：取消并 join 在途任务，最后停车
    ///
    /// 由持有调度器的生命周期层在关停时调用。
    pub fn shutdown(&self) -> Result<(), DriveError> {
        self.cancel.store(true, Ordering::Release);
        let mut slot = self.task.lock().map_err(|_| DriveError::PoisonedLock)?;
        if let Some(handle) = slot.take() {
            if handle.join().is_err() {
                warn!("drive task panicked during shutdown");
            }
        }
        self.motor.tank(0.0, 0.0)?;
        self.state.set(SchedulerState::Idle, Ordering::Release);
        info!("drive scheduler shut down");
        Ok(())
    }
}

/// 驱动任务主体：下发一次，轮询等待，到期/被取消后无条件停止
///
/// 首次下发失败时跳过等待，但停止下发仍然执行——任何退出路径都不会
/// 让电机停留在非停止状态，也不会让调度器滞留在 Driving。
fn drive_for<B: PwmBus>(
    motor: Arc<MotorDriver<B>>,
    vector: TankVector,
    duration: f64,
    cancel: Arc<AtomicBool>,
    state: Arc<AtomicSchedulerState>,
    poll_interval: Duration,
) {
    let applied = motor.tank(vector.left, vector.right);
    if let Err(e) = &applied {
        error!("drive task failed to apply vector: {}", e);
    }

    if applied.is_ok() {
        let deadline = Instant::now() + Duration::from_secs_f64(duration);
        while Instant::now() < deadline {
            // Acquire: 读到置位时必须能看到调度方此前的全部写入
            if cancel.load(Ordering::Acquire) {
                debug!("drive task cancelled");
                break;
            }
            spin_sleep::sleep(poll_interval);
        }
    }

    // 无条件停止：自然到期、被取消、首次下发失败都走这里
    if let Err(e) = motor.tank(0.0, 0.0) {
        error!("drive task failed to stop motors: {}", e);
    }
    state.set(SchedulerState::Idle, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_state_conversions() {
        assert_eq!(SchedulerState::Idle.as_u8(), 0);
        assert_eq!(SchedulerState::Driving.as_u8(), 1);
        assert_eq!(SchedulerState::from_u8(0), SchedulerState::Idle);
        assert_eq!(SchedulerState::from_u8(1), SchedulerState::Driving);
        assert_eq!(SchedulerState::from_u8(255), SchedulerState::Idle);

        assert!(SchedulerState::Driving.is_driving());
        assert!(!SchedulerState::Driving.is_idle());
        assert!(SchedulerState::Idle.is_idle());
    }

    #[test]
    fn test_atomic_scheduler_state() {
        let state = AtomicSchedulerState::default();
        assert_eq!(state.get(Ordering::Relaxed), SchedulerState::Idle);

        state.set(SchedulerState::Driving, Ordering::Relaxed);
        assert_eq!(state.get(Ordering::Relaxed), SchedulerState::Driving);
    }
}
