//! PCA9685 PWM 适配器实现
//!
//! Waveshare 电机扩展板使用的 16 通道 12 位 PWM 控制器，挂在 I2C 总线上
//! （默认地址 0x40）。通过 `/dev/i2c-*` 字符设备直接读写寄存器。
//!
//! ## 依赖
//!
//! - Linux 内核 `i2c-dev` 模块（`modprobe i2c-dev`）
//! - 对 `/dev/i2c-*` 的读写权限（`i2c` 组或 root）
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**：I2C 字符设备是 Linux 内核特性
//! - 未做多进程互斥，同一总线上的并发访问由上层序列化

use crate::{CHANNEL_COUNT, PwmBus, PwmDeviceError, PwmDeviceErrorKind, PwmError};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::AsRawFd;
use std::time::Duration;
use tracing::{debug, trace};

// 寄存器地址
const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;

// MODE1 位
const MODE1_SLEEP: u8 = 0x10;
const MODE1_RESTART: u8 = 0x80;

/// 内部振荡器频率（Hz）
const OSC_CLOCK_HZ: f64 = 25_000_000.0;
/// 12 位计数器周期
const PWM_RESOLUTION: u16 = 4096;

/// ioctl 请求号：选择 I2C 从设备地址
const I2C_SLAVE: libc::c_ulong = 0x0703;

nix::ioctl_write_int_bad!(i2c_set_slave_addr, I2C_SLAVE as libc::c_int);

/// 占空比百分比 → 12 位比较值
///
/// 端点精确：0 → 0，100 → 4095。越界输入截断到 100。
pub fn duty_to_ticks(percent: u8) -> u16 {
    let percent = percent.min(100) as u32;
    (percent * (PWM_RESOLUTION as u32 - 1) / 100) as u16
}

/// 给定输出频率对应的预分频值
///
/// `prescale = round(osc / (4096 * freq)) - 1`，50 Hz 时为 121。
/// 结果截断到芯片支持的 [3, 255] 范围。
pub fn prescale_for(freq_hz: f64) -> u8 {
    let prescale = (OSC_CLOCK_HZ / (PWM_RESOLUTION as f64 * freq_hz) + 0.5).floor() - 1.0;
    prescale.clamp(3.0, 255.0) as u8
}

/// PCA9685 适配器
///
/// 实现 [`PwmBus`] trait，提供 Linux 平台下的 I2C PWM 控制。
///
/// # 示例
///
/// ```no_run
/// use trax_pwm::{Pca9685, PwmBus};
///
/// let mut pwm = Pca9685::open("/dev/i2c-1", 0x40).unwrap();
/// pwm.set_pwm_freq(50.0).unwrap();
/// pwm.set_duty_cycle(0, 60).unwrap();
/// ```
#[derive(Debug)]
pub struct Pca9685 {
    /// I2C 字符设备句柄
    dev: File,
    /// 从设备地址（通常 0x40）
    address: u16,
    /// 总线路径（用于日志）
    bus_path: String,
}

impl Pca9685 {
    /// 打开 I2C 总线并绑定从设备地址
    ///
    /// 打开失败时返回带修复指引的错误信息（设备不存在 / 权限不足）。
    ///
    /// # 参数
    /// - `bus_path`: I2C 字符设备路径（如 "/dev/i2c-1"）
    /// - `address`: 从设备地址（Waveshare 扩展板为 0x40）
    ///
    /// # 错误
    /// - `PwmError::Device`:
    ///   - 设备节点不存在（会提示加载 i2c-dev 模块）
    ///   - 权限不足（会提示加入 i2c 组）
    ///   - 绑定从设备地址失败
    pub fn open(bus_path: impl Into<String>, address: u16) -> Result<Self, PwmError> {
        let bus_path = bus_path.into();

        let dev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&bus_path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => PwmError::Device(PwmDeviceError::new(
                    PwmDeviceErrorKind::NotFound,
                    format!(
                        "I2C bus '{}' not found. Load the i2c-dev module first:\n  sudo modprobe i2c-dev",
                        bus_path
                    ),
                )),
                ErrorKind::PermissionDenied => PwmError::Device(PwmDeviceError::new(
                    PwmDeviceErrorKind::AccessDenied,
                    format!(
                        "Permission denied opening '{}'. Add your user to the i2c group:\n  sudo usermod -aG i2c $USER",
                        bus_path
                    ),
                )),
                _ => PwmError::Io(e),
            })?;

        unsafe { i2c_set_slave_addr(dev.as_raw_fd(), address as libc::c_int) }.map_err(|e| {
            PwmError::Device(PwmDeviceError::new(
                PwmDeviceErrorKind::Busy,
                format!("I2C_SLAVE ioctl failed for address 0x{:02X}: {}", address, e),
            ))
        })?;

        let mut this = Self {
            dev,
            address,
            bus_path,
        };

        // 复位 MODE1：清除睡眠位，进入正常工作模式
        this.write_reg(MODE1, 0x00)?;
        debug!(
            "PCA9685 initialized on {} at address 0x{:02X}",
            this.bus_path, this.address
        );

        Ok(this)
    }

    /// 设置 PWM 输出频率
    ///
    /// 修改预分频寄存器要求芯片先进入睡眠模式，写入后恢复并置 RESTART 位。
    ///
    /// # 参数
    /// - `freq_hz`: 输出频率（电机驱动典型值 50 Hz）
    pub fn set_pwm_freq(&mut self, freq_hz: f64) -> Result<(), PwmError> {
        let prescale = prescale_for(freq_hz);

        let old_mode = self.read_reg(MODE1)?;
        let sleep_mode = (old_mode & !MODE1_RESTART) | MODE1_SLEEP;

        self.write_reg(MODE1, sleep_mode)?;
        self.write_reg(PRESCALE, prescale)?;
        self.write_reg(MODE1, old_mode)?;
        // 振荡器稳定时间，数据手册要求 >500µs
        std::thread::sleep(Duration::from_millis(5));
        self.write_reg(MODE1, old_mode | MODE1_RESTART)?;

        debug!("PCA9685 PWM frequency set to {} Hz (prescale={})", freq_hz, prescale);
        Ok(())
    }

    /// 写单个通道的 ON/OFF 比较值
    fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<(), PwmError> {
        if channel >= CHANNEL_COUNT {
            return Err(PwmError::InvalidChannel(channel));
        }
        let base = LED0_ON_L + 4 * channel;
        self.write_reg(base, (on & 0xFF) as u8)?;
        self.write_reg(base + 1, (on >> 8) as u8)?;
        self.write_reg(base + 2, (off & 0xFF) as u8)?;
        self.write_reg(base + 3, (off >> 8) as u8)?;
        trace!("PCA9685 ch{}: on={}, off={}", channel, on, off);
        Ok(())
    }

    fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), PwmError> {
        self.dev.write_all(&[reg, value])?;
        Ok(())
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, PwmError> {
        self.dev.write_all(&[reg])?;
        let mut buf = [0u8; 1];
        self.dev.read_exact(&mut buf)?;
        Ok(buf[0])
    }
}

impl PwmBus for Pca9685 {
    fn set_duty_cycle(&mut self, channel: u8, percent: u8) -> Result<(), PwmError> {
        self.set_pwm(channel, 0, duty_to_ticks(percent))
    }

    fn set_level(&mut self, channel: u8, high: bool) -> Result<(), PwmError> {
        let off = if high { PWM_RESOLUTION - 1 } else { 0 };
        self.set_pwm(channel, 0, off)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duty_to_ticks_endpoints() {
        assert_eq!(duty_to_ticks(0), 0);
        assert_eq!(duty_to_ticks(100), 4095);
    }

    #[test]
    fn test_duty_to_ticks_midpoints() {
        assert_eq!(duty_to_ticks(50), 2047);
        assert_eq!(duty_to_ticks(1), 40);
        assert_eq!(duty_to_ticks(99), 4054);
    }

    #[test]
    fn test_duty_to_ticks_clamps_over_100() {
        assert_eq!(duty_to_ticks(101), 4095);
        assert_eq!(duty_to_ticks(255), 4095);
    }

    #[test]
    fn test_prescale_for_50hz() {
        // 25 MHz / (4096 * 50) = 122.07 → round = 122 → prescale 121
        assert_eq!(prescale_for(50.0), 121);
    }

    #[test]
    fn test_prescale_for_1khz() {
        // 25 MHz / (4096 * 1000) = 6.1 → round = 6 → prescale 5
        assert_eq!(prescale_for(1000.0), 5);
    }
}
