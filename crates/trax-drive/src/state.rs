//! 状态存储模块
//!
//! 保存最近一次被接受的逻辑状态（命令、速度、时长、修订号、时间戳），
//! 提供一致的快照读取和崩溃一致的落盘。
//!
//! # 一致性
//!
//! 读-改-写-落盘全程在同一互斥区内完成：并发读者看不到半更新状态，
//! 也不会出现丢失更新。落盘采用"写临时文件再原子改名"，崩溃发生在
//! 改名之前时磁盘上保留上一份完整快照。
//!
//! # 权威性
//!
//! 内存状态是服务请求的权威数据；磁盘副本只用于重启恢复，落盘失败
//! 记录日志但不回滚内存状态。

use crate::command::DriveCommand;
use crate::error::DriveError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// 机器人逻辑状态（持久化快照）
///
/// `command_id` 是严格递增的修订号：每次被接受的变更加一，读者可据此
/// 判断快照新旧。`timestamp` 为秒级 Unix 时间。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub command: DriveCommand,
    pub command_id: u64,
    pub timestamp: u64,
    pub speed: f64,
    pub duration: f64,
}

impl Default for RobotState {
    fn default() -> Self {
        Self {
            up: false,
            down: false,
            left: false,
            right: false,
            command: DriveCommand::Stop,
            command_id: 0,
            timestamp: 0,
            speed: 0.6,
            duration: 0.8,
        }
    }
}

/// 单次状态变更的字段集合，`None` 表示保持原值
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub up: Option<bool>,
    pub down: Option<bool>,
    pub left: Option<bool>,
    pub right: Option<bool>,
    pub command: Option<DriveCommand>,
    pub speed: Option<f64>,
    pub duration: Option<f64>,
}

impl StateUpdate {
    /// 只更新命令字段的便捷构造
    pub fn command(command: DriveCommand) -> Self {
        Self {
            command: Some(command),
            ..Default::default()
        }
    }
}

/// 状态存储（对外 API）
///
/// 进程启动时创建一次，被所有请求处理方共享；调用方永远拿不到
/// 指向内部状态的可变引用，只有快照副本。
#[derive(Debug)]
pub struct StateStore {
    inner: Mutex<RobotState>,
    path: PathBuf,
}

impl StateStore {
    /// 打开状态存储，尝试从磁盘恢复上一份快照
    ///
    /// 文件缺失或损坏时回退到默认停止状态（恢复是尽力而为的）。
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match Self::recover(&path) {
            Some(state) => {
                info!(
                    "robot state recovered from {} (command_id={})",
                    path.display(),
                    state.command_id
                );
                state
            },
            None => RobotState {
                timestamp: unix_now(),
                ..Default::default()
            },
        };
        Self {
            inner: Mutex::new(state),
            path,
        }
    }

    /// 从磁盘读取快照；任何失败都返回 None
    fn recover(path: &Path) -> Option<RobotState> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no durable state at {}, starting fresh", path.display());
                return None;
            },
            Err(e) => {
                warn!("failed to read durable state {}: {}", path.display(), e);
                return None;
            },
        };
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(
                    "durable state {} is corrupt, starting fresh: {}",
                    path.display(),
                    e
                );
                None
            },
        }
    }

    /// 读取一致快照（副本，不是活引用）
    pub fn read(&self) -> Result<RobotState, DriveError> {
        let state = self.inner.lock().map_err(|_| DriveError::PoisonedLock)?;
        Ok(state.clone())
    }

    /// 应用一次变更并返回结果快照
    ///
    /// 速度截断到 `[0, 1]`，时长截断到 `[0.05, 5.0]`；修订号加一，
    /// 时间戳取当前时刻；随后在同一互斥区内落盘。落盘失败只记日志，
    /// 返回的仍是权威的内存快照。
    pub fn update(&self, update: StateUpdate) -> Result<RobotState, DriveError> {
        let mut state = self.inner.lock().map_err(|_| DriveError::PoisonedLock)?;

        if let Some(up) = update.up {
            state.up = up;
        }
        if let Some(down) = update.down {
            state.down = down;
        }
        if let Some(left) = update.left {
            state.left = left;
        }
        if let Some(right) = update.right {
            state.right = right;
        }
        if let Some(command) = update.command {
            state.command = command;
        }
        if let Some(speed) = update.speed {
            state.speed = speed.clamp(0.0, 1.0);
        }
        if let Some(duration) = update.duration {
            state.duration = duration.clamp(0.05, 5.0);
        }

        state.command_id += 1;
        state.timestamp = unix_now();
        let snapshot = state.clone();

        if let Err(e) = Self::persist(&self.path, &snapshot) {
            warn!("state persistence failed (in-memory state remains valid): {}", e);
        }

        Ok(snapshot)
    }

    /// 把快照原子地写入磁盘
    ///
    /// 先写 `<path>.tmp` 再改名覆盖目标文件，磁盘副本的读者永远看不到
    /// 半写状态。
    pub fn persist(path: &Path, snapshot: &RobotState) -> Result<(), DriveError> {
        let payload = serde_json::to_vec(snapshot)?;
        let tmp = tmp_path(path);
        fs::write(&tmp, &payload).map_err(|source| DriveError::Persistence {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, path).map_err(|source| DriveError::Persistence {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// 当前落盘路径
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 临时文件路径：`robot_state.json` → `robot_state.json.tmp`
fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

/// 秒级 Unix 时间戳
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> StateStore {
        StateStore::open(dir.path().join("robot_state.json"))
    }

    #[test]
    fn test_default_state() {
        let state = RobotState::default();
        assert_eq!(state.command, DriveCommand::Stop);
        assert_eq!(state.command_id, 0);
        assert_eq!(state.speed, 0.6);
        assert_eq!(state.duration, 0.8);
    }

    #[test]
    fn test_update_increments_revision() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let first = store.update(StateUpdate::command(DriveCommand::Forward)).unwrap();
        let second = store.update(StateUpdate::command(DriveCommand::Left)).unwrap();
        let third = store.update(StateUpdate::default()).unwrap();

        assert_eq!(first.command_id, 1);
        assert_eq!(second.command_id, 2);
        assert_eq!(third.command_id, 3);
        assert_eq!(third.command, DriveCommand::Left); // 未更新的字段保持原值
    }

    #[test]
    fn test_read_returns_copy() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let snap1 = store.read().unwrap();
        store.update(StateUpdate::command(DriveCommand::Back)).unwrap();
        let snap2 = store.read().unwrap();

        // 旧快照不受后续变更影响
        assert_eq!(snap1.command, DriveCommand::Stop);
        assert_eq!(snap2.command, DriveCommand::Back);
    }

    #[test]
    fn test_update_clamps_fields() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let snap = store
            .update(StateUpdate {
                speed: Some(1.7),
                duration: Some(60.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(snap.speed, 1.0);
        assert_eq!(snap.duration, 5.0);

        let snap = store
            .update(StateUpdate {
                speed: Some(-0.5),
                duration: Some(0.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(snap.speed, 0.0);
        assert_eq!(snap.duration, 0.05);
    }

    #[test]
    fn test_persist_and_recover_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("robot_state.json");

        {
            let store = StateStore::open(&path);
            store
                .update(StateUpdate {
                    up: Some(true),
                    command: Some(DriveCommand::Forward),
                    speed: Some(0.8),
                    ..Default::default()
                })
                .unwrap();
        }

        let reopened = StateStore::open(&path);
        let snap = reopened.read().unwrap();
        assert!(snap.up);
        assert_eq!(snap.command, DriveCommand::Forward);
        assert_eq!(snap.command_id, 1);
        assert_eq!(snap.speed, 0.8);
    }

    #[test]
    fn test_persist_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("robot_state.json");
        let snapshot = RobotState {
            command: DriveCommand::Right,
            command_id: 7,
            timestamp: 1_700_000_000,
            ..Default::default()
        };

        StateStore::persist(&path, &snapshot).unwrap();
        let first = fs::read(&path).unwrap();
        StateStore::persist(&path, &snapshot).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_crash_before_rename_keeps_prior_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("robot_state.json");
        let snapshot = RobotState {
            command_id: 3,
            ..Default::default()
        };
        StateStore::persist(&path, &snapshot).unwrap();

        // 模拟崩溃：临时文件写了一半，改名从未发生
        fs::write(tmp_path(&path), b"{\"command_id\": 4, \"comman").unwrap();

        let reopened = StateStore::open(&path);
        assert_eq!(reopened.read().unwrap().command_id, 3);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("robot_state.json");
        fs::write(&path, b"not json at all").unwrap();

        let store = StateStore::open(&path);
        let snap = store.read().unwrap();
        assert_eq!(snap.command, DriveCommand::Stop);
        assert_eq!(snap.command_id, 0);
    }

    #[test]
    fn test_persist_failure_does_not_roll_back() {
        let dir = TempDir::new().unwrap();
        // 落盘目标指向一个不存在的子目录：每次 persist 都失败
        let store = StateStore::open(dir.path().join("missing").join("state.json"));

        let snap = store.update(StateUpdate::command(DriveCommand::Forward)).unwrap();
        assert_eq!(snap.command_id, 1);
        assert_eq!(snap.command, DriveCommand::Forward);

        // 内存状态仍是权威数据
        assert_eq!(store.read().unwrap().command_id, 1);
    }

    #[test]
    fn test_tmp_path_suffix() {
        assert_eq!(
            tmp_path(Path::new("/data/robot_state.json")),
            PathBuf::from("/data/robot_state.json.tmp")
        );
    }

    #[test]
    fn test_snapshot_json_fields() {
        let snapshot = RobotState::default();
        let json = serde_json::to_value(&snapshot).unwrap();
        for field in [
            "up",
            "down",
            "left",
            "right",
            "command",
            "command_id",
            "timestamp",
            "speed",
            "duration",
        ] {
            assert!(json.get(field).is_some(), "missing field: {}", field);
        }
        assert_eq!(json["command"], "stop");
    }
}
