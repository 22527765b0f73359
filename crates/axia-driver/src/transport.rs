//! 传输层抽象
//!
//! RDT 协议只需要两个动作：接收数据报、发送 8 字节控制帧。
//! 传输通过 `split()` 分离为接收端和发送端：接收端移动到采集线程，
//! 发送端留在控制线程，两者物理隔离，互不阻塞。

use crate::error::TransportError;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::debug;

/// 接收端
pub trait RdtRx {
    /// 接收一个数据报，返回写入 `buf` 的字节数
    ///
    /// 超时返回 `TransportError::Timeout`。
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

/// 发送端
pub trait RdtTx {
    /// 发送一个完整的帧（不等待应答）
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}

/// 可分离为收发两端的传输
pub trait SplittableTransport {
    type Rx: RdtRx;
    type Tx: RdtTx;
    fn split(self) -> Result<(Self::Rx, Self::Tx), TransportError>;
}

impl<R: RdtRx + ?Sized> RdtRx for Box<R> {
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).receive(buf)
    }
}

impl<T: RdtTx + ?Sized> RdtTx for Box<T> {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).send(frame)
    }
}

/// UDP 传输
///
/// 套接字绑定到本地临时端口，并 `connect` 到传感器端点：
/// `send` 只发往传感器，`recv` 只接收来自传感器的数据报。
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    /// 创建并连接 UDP 套接字
    ///
    /// # 参数
    /// - `peer`: 传感器 RDT 端点（如 `192.168.1.1:49152`）
    /// - `receive_timeout`: 接收超时（决定停止信号的最大响应延迟）
    pub fn connect(peer: SocketAddr, receive_timeout: Duration) -> Result<Self, TransportError> {
        let bind_addr: SocketAddr = if peer.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(peer)?;
        // 零超时会被 std 拒绝，最小 1ms
        socket.set_read_timeout(Some(receive_timeout.max(Duration::from_millis(1))))?;

        debug!(
            "UDP transport bound to {:?}, connected to {}",
            socket.local_addr().ok(),
            peer
        );

        Ok(Self { socket, peer })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl SplittableTransport for UdpTransport {
    type Rx = UdpRx;
    type Tx = UdpTx;

    fn split(self) -> Result<(UdpRx, UdpTx), TransportError> {
        let tx_socket = self.socket.try_clone()?;
        Ok((
            UdpRx {
                socket: self.socket,
            },
            UdpTx { socket: tx_socket },
        ))
    }
}

/// UDP 接收端
pub struct UdpRx {
    socket: UdpSocket,
}

impl RdtRx for UdpRx {
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.socket.recv(buf) {
            Ok(len) => Ok(len),
            // Unix 上超时为 WouldBlock，Windows 上为 TimedOut
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(TransportError::Timeout)
            },
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => Err(TransportError::Refused),
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

/// UDP 发送端
pub struct UdpTx {
    socket: UdpSocket,
}

impl RdtTx for UdpTx {
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let sent = self.socket.send(frame)?;
        if sent != frame.len() {
            return Err(TransportError::ShortWrite {
                sent,
                expected: frame.len(),
            });
        }
        Ok(())
    }
}
