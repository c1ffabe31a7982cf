//! 驱动配置
//!
//! 底盘的静态配置：总线位置、PWM 频率、轮询间隔、落盘路径和时长窗口。
//! TOML 文件加载，字段全部有默认值。

use crate::error::DriveError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 驱动配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// I2C 字符设备路径
    pub i2c_bus: String,

    /// PWM 控制器从设备地址
    pub i2c_addr: u16,

    /// PWM 输出频率（Hz）
    pub pwm_freq_hz: f64,

    /// 驱动任务的取消轮询间隔（毫秒）
    pub poll_interval_ms: u64,

    /// 状态快照落盘路径
    pub state_path: String,

    /// 单次定时驱动的最短时长（秒）
    pub min_duration_s: f64,

    /// 单次定时驱动的最长时长（秒）
    pub max_duration_s: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            i2c_bus: "/dev/i2c-1".to_string(),
            i2c_addr: 0x40,
            pwm_freq_hz: 50.0,
            poll_interval_ms: 50,
            state_path: "robot_state.json".to_string(),
            min_duration_s: 0.05,
            max_duration_s: 5.0,
        }
    }
}

impl DriveConfig {
    /// 从 TOML 文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, DriveError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DriveError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 把请求时长截断到配置的窗口内
    pub fn clamp_duration(&self, duration: f64) -> f64 {
        duration.clamp(self.min_duration_s, self.max_duration_s)
    }

    /// 轮询间隔
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
