//! 命令解释模块
//!
//! 把方向指令（显式命令字符串或方向键标志）解释为左右轮速度向量。
//! 全部是纯函数，无硬件依赖，可独立测试。

use crate::motor::SPEED_EPSILON;
use serde::{Deserialize, Serialize};

/// 左右轮速度向量
///
/// 两个分量都在 `[-1.0, 1.0]`：符号表示方向（正 = 前进），
/// 幅值表示速度占比。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TankVector {
    pub left: f64,
    pub right: f64,
}

impl TankVector {
    /// 零向量（双侧停止）
    pub const ZERO: TankVector = TankVector {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    /// 是否为停止向量（双侧幅值都小于电机死区）
    pub fn is_zero(&self) -> bool {
        self.left.abs() < SPEED_EPSILON && self.right.abs() < SPEED_EPSILON
    }
}

/// 方向键标志（原始输入，仅作信息记录）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectionFlags {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl DirectionFlags {
    /// 按固定优先级 up > down > left > right 推导命令，全假 → Stop
    pub fn command(self) -> DriveCommand {
        if self.up {
            DriveCommand::Forward
        } else if self.down {
            DriveCommand::Back
        } else if self.left {
            DriveCommand::Left
        } else if self.right {
            DriveCommand::Right
        } else {
            DriveCommand::Stop
        }
    }
}

/// 规范化驱动命令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveCommand {
    #[default]
    Stop,
    Forward,
    Back,
    Left,
    Right,
}

impl DriveCommand {
    /// 从原始字符串解析（大小写不敏感）
    ///
    /// 别名：`forward`/`start`/`move` → Forward，`back`/`backward` → Back。
    /// 无法识别的输入一律视为 Stop。
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "forward" | "start" | "move" => DriveCommand::Forward,
            "back" | "backward" => DriveCommand::Back,
            "left" => DriveCommand::Left,
            "right" => DriveCommand::Right,
            _ => DriveCommand::Stop,
        }
    }

    /// 规范化命令名（持久化快照中使用）
    pub fn as_str(self) -> &'static str {
        match self {
            DriveCommand::Stop => "stop",
            DriveCommand::Forward => "forward",
            DriveCommand::Back => "back",
            DriveCommand::Left => "left",
            DriveCommand::Right => "right",
        }
    }

    /// 解析优先级：显式命令字符串优先，否则按方向键标志推导
    ///
    /// 空字符串等同于未给出命令（与边界层的"字段缺省"语义一致）。
    pub fn resolve(explicit: Option<&str>, flags: DirectionFlags) -> Self {
        match explicit {
            Some(raw) if !raw.is_empty() => Self::parse(raw),
            _ => flags.command(),
        }
    }

    /// 命令 → 左右轮向量，`speed` 防御性截断到 `[0, 1]`
    pub fn to_vector(self, speed: f64) -> TankVector {
        let sp = speed.clamp(0.0, 1.0);
        match self {
            DriveCommand::Forward => TankVector::new(sp, sp),
            DriveCommand::Back => TankVector::new(-sp, -sp),
            DriveCommand::Left => TankVector::new(-sp, sp),
            DriveCommand::Right => TankVector::new(sp, -sp),
            DriveCommand::Stop => TankVector::ZERO,
        }
    }
}

/// 一步完成解释：`(command?, flags, speed) → 向量`
pub fn interpret(command: Option<&str>, flags: DirectionFlags, speed: f64) -> TankVector {
    DriveCommand::resolve(command, flags).to_vector(speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(DriveCommand::parse("forward"), DriveCommand::Forward);
        assert_eq!(DriveCommand::parse("start"), DriveCommand::Forward);
        assert_eq!(DriveCommand::parse("move"), DriveCommand::Forward);
        assert_eq!(DriveCommand::parse("back"), DriveCommand::Back);
        assert_eq!(DriveCommand::parse("backward"), DriveCommand::Back);
        assert_eq!(DriveCommand::parse("left"), DriveCommand::Left);
        assert_eq!(DriveCommand::parse("right"), DriveCommand::Right);
        assert_eq!(DriveCommand::parse("stop"), DriveCommand::Stop);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(DriveCommand::parse("Forward"), DriveCommand::Forward);
        assert_eq!(DriveCommand::parse("BACKWARD"), DriveCommand::Back);
        assert_eq!(DriveCommand::parse("LeFt"), DriveCommand::Left);
    }

    #[test]
    fn test_parse_unknown_is_stop() {
        assert_eq!(DriveCommand::parse("spin"), DriveCommand::Stop);
        assert_eq!(DriveCommand::parse(""), DriveCommand::Stop);
        assert_eq!(DriveCommand::parse("前进"), DriveCommand::Stop);
    }

    #[test]
    fn test_flag_priority() {
        // up > down > left > right
        let all = DirectionFlags {
            up: true,
            down: true,
            left: true,
            right: true,
        };
        assert_eq!(all.command(), DriveCommand::Forward);

        let no_up = DirectionFlags {
            up: false,
            down: true,
            left: true,
            right: true,
        };
        assert_eq!(no_up.command(), DriveCommand::Back);

        let lr = DirectionFlags {
            left: true,
            right: true,
            ..Default::default()
        };
        assert_eq!(lr.command(), DriveCommand::Left);

        let r = DirectionFlags {
            right: true,
            ..Default::default()
        };
        assert_eq!(r.command(), DriveCommand::Right);

        assert_eq!(DirectionFlags::default().command(), DriveCommand::Stop);
    }

    #[test]
    fn test_explicit_command_wins_over_flags() {
        let flags = DirectionFlags {
            up: true,
            ..Default::default()
        };
        assert_eq!(
            DriveCommand::resolve(Some("left"), flags),
            DriveCommand::Left
        );
        // 空字符串等同于未给出
        assert_eq!(DriveCommand::resolve(Some(""), flags), DriveCommand::Forward);
        assert_eq!(DriveCommand::resolve(None, flags), DriveCommand::Forward);
    }

    #[test]
    fn test_canonical_vectors() {
        let sp = 0.6;
        assert_eq!(
            DriveCommand::Forward.to_vector(sp),
            TankVector::new(0.6, 0.6)
        );
        assert_eq!(DriveCommand::Back.to_vector(sp), TankVector::new(-0.6, -0.6));
        assert_eq!(DriveCommand::Left.to_vector(sp), TankVector::new(-0.6, 0.6));
        assert_eq!(DriveCommand::Right.to_vector(sp), TankVector::new(0.6, -0.6));
        assert_eq!(DriveCommand::Stop.to_vector(sp), TankVector::ZERO);
    }

    #[test]
    fn test_speed_clamped() {
        assert_eq!(
            DriveCommand::Forward.to_vector(1.5),
            TankVector::new(1.0, 1.0)
        );
        assert_eq!(
            DriveCommand::Back.to_vector(-0.3),
            TankVector::new(-0.0, 0.0)
        );
    }

    #[test]
    fn test_interpret_no_input_is_stop() {
        let v = interpret(None, DirectionFlags::default(), 0.6);
        assert_eq!(v, TankVector::ZERO);
        assert!(v.is_zero());
    }

    #[test]
    fn test_is_zero_epsilon() {
        assert!(TankVector::new(0.0005, -0.0005).is_zero());
        assert!(!TankVector::new(0.002, 0.0).is_zero());
    }
}
