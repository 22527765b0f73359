//! RDT 控制帧
//!
//! 控制帧用于通知传感器开始或停止发送测量数据。
//! 传感器不会对控制帧做任何应答（fire-and-forget）。

use crate::ProtocolError;
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 控制帧头部魔数
pub const CONTROL_MAGIC: u16 = 0x1234;

/// 控制帧长度（字节）
pub const CONTROL_FRAME_LEN: usize = 8;

/// 采样数量为 0 表示无限发送
pub const INFINITE_SAMPLES: u32 = 0;

/// RDT 命令码
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
pub enum CommandCode {
    /// 停止发送
    Stop = 0,
    /// 发送指定数量的记录后自动停止
    StartFinite = 1,
    /// 连续发送
    StartContinuous = 3,
}

/// 控制帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrame {
    pub command: CommandCode,
    /// 请求的记录数量（0 = 无限）
    pub sample_count: u32,
}

impl ControlFrame {
    pub const fn new(command: CommandCode, sample_count: u32) -> Self {
        Self {
            command,
            sample_count,
        }
    }

    /// 停止数据流
    pub const fn stop() -> Self {
        Self::new(CommandCode::Stop, INFINITE_SAMPLES)
    }

    /// 启动连续数据流
    pub const fn start_continuous() -> Self {
        Self::new(CommandCode::StartContinuous, INFINITE_SAMPLES)
    }

    /// 请求传感器发送 `count` 条记录
    pub const fn start_n(count: u32) -> Self {
        Self::new(CommandCode::StartFinite, count)
    }

    /// 编码为 8 字节大端帧
    pub fn encode(&self) -> [u8; CONTROL_FRAME_LEN] {
        let mut frame = [0u8; CONTROL_FRAME_LEN];
        let mut cursor = &mut frame[..];
        cursor.put_u16(CONTROL_MAGIC);
        cursor.put_u16(self.command.into());
        cursor.put_u32(self.sample_count);
        frame
    }

    /// 从原始字节解码（长度必须正好是 8 字节）
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != CONTROL_FRAME_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: CONTROL_FRAME_LEN,
                actual: bytes.len(),
            });
        }

        let mut buf = bytes;
        let magic = buf.get_u16();
        if magic != CONTROL_MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let code = buf.get_u16();
        let command =
            CommandCode::try_from(code).map_err(|_| ProtocolError::UnknownCommand(code))?;
        let sample_count = buf.get_u32();

        Ok(Self {
            command,
            sample_count,
        })
    }
}

/// 编码控制帧
pub fn encode_control(command: CommandCode, sample_count: u32) -> [u8; CONTROL_FRAME_LEN] {
    ControlFrame::new(command, sample_count).encode()
}

/// 解码控制帧
pub fn decode_control(bytes: &[u8]) -> Result<ControlFrame, ProtocolError> {
    ControlFrame::decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_stop() {
        let frame = ControlFrame::stop().encode();
        assert_eq!(frame, [0x12, 0x34, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_start_continuous() {
        let frame = encode_control(CommandCode::StartContinuous, INFINITE_SAMPLES);
        assert_eq!(frame, [0x12, 0x34, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_start_n_big_endian_count() {
        let frame = ControlFrame::start_n(0x0102_0304).encode();
        assert_eq!(frame, [0x12, 0x34, 0x00, 0x01, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_roundtrip_all_commands() {
        for frame in [
            ControlFrame::stop(),
            ControlFrame::start_continuous(),
            ControlFrame::start_n(5),
            ControlFrame::start_n(u32::MAX),
        ] {
            let decoded = decode_control(&frame.encode()).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let err = decode_control(&[0x12, 0x34, 0x00]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidLength {
                expected: 8,
                actual: 3
            }
        );
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let err = decode_control(&[0xAB, 0xCD, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidMagic(0xABCD));
    }

    #[test]
    fn test_decode_rejects_unknown_command() {
        let err = decode_control(&[0x12, 0x34, 0x00, 0x02, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownCommand(2));
    }
}
