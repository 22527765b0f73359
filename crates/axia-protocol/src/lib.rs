//! # Axia Protocol
//!
//! Axia 六维力/力矩传感器 RDT（Raw Data Transfer）UDP 协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `control`: 控制帧构建（启动/停止数据流）
//! - `record`: 测量记录解析与物理单位换算
//!
//! ## 字节序
//!
//! 协议所有字段均使用大端字节序（网络字节序）。
//!
//! ## 帧格式
//!
//! ```text
//! 控制帧（8 字节，客户端 → 传感器）:
//! [magic: u16 = 0x1234][command: u16][sample_count: u32]
//!
//! 数据帧（36 × n 字节，传感器 → 客户端，记录之间无分隔符）:
//! [rdt_sequence: u32][ft_sequence: u32][status: u32][Fx Fy Fz Tx Ty Tz: i32 × 6]
//! ```

pub mod control;
pub mod record;

// 重新导出常用类型
pub use control::*;
pub use record::*;

use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid control frame magic: 0x{0:04X}")]
    InvalidMagic(u16),

    #[error("Unknown command code: {0}")]
    UnknownCommand(u16),

    /// 计数换算系数非法（0、NaN 或无穷大）
    #[error("Invalid scaling factor {name}: {value}")]
    InvalidScaling { name: &'static str, value: f64 },
}
