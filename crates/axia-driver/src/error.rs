//! 驱动层错误类型定义

use axia_protocol::ProtocolError;
use thiserror::Error;

/// 传输层错误类型
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// 接收超时（正常现象，传感器未发送数据）
    #[error("Read timeout")]
    Timeout,

    /// 对端不可达（ICMP port unreachable，UDP 无连接，可恢复）
    #[error("Peer refused datagram")]
    Refused,

    #[error("Short write: sent {sent} of {expected} bytes")]
    ShortWrite { sent: usize, expected: usize },

    #[error("Invalid sensor endpoint: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}

impl TransportError {
    /// 是否为致命错误（采集线程必须退出）
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Timeout | TransportError::Refused)
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议错误（换算系数非法等）
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 尚未调用 `connect()`
    #[error("Not connected")]
    NotConnected,

    /// 采集线程已在运行
    #[error("Capture thread already running")]
    AlreadyRunning,

    /// 采集线程错误（panic 或退出超时）
    #[error("Capture thread error: {0}")]
    IoThread(String),
}

impl From<std::io::Error> for DriverError {
    fn from(error: std::io::Error) -> Self {
        DriverError::Transport(TransportError::Io(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::NotConnected;
        assert_eq!(format!("{}", err), "Not connected");

        let err = DriverError::Transport(TransportError::Timeout);
        assert!(format!("{}", err).contains("Read timeout"));

        let err = DriverError::IoThread("join timeout".to_string());
        let msg = format!("{}", err);
        assert!(msg.contains("Capture thread") && msg.contains("join timeout"));

        let err = DriverError::Protocol(ProtocolError::InvalidMagic(0xBEEF));
        assert!(format!("{}", err).contains("0xBEEF"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!TransportError::Timeout.is_fatal());
        assert!(!TransportError::Refused.is_fatal());
        assert!(TransportError::ShortWrite { sent: 4, expected: 8 }.is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(TransportError::Io(io).is_fatal());
        let parse = "not-an-addr".parse::<std::net::SocketAddr>().unwrap_err();
        assert!(TransportError::AddrParse(parse).is_fatal());
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: DriverError = io.into();
        assert!(matches!(err, DriverError::Transport(TransportError::Io(_))));
    }
}
