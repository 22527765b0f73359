//! 采集循环（对外 API）
//!
//! `CaptureLoop` 持有传输的收发两端和采集线程：
//! - 发送端留在调用线程，用于发送启动/停止控制帧；
//! - 接收端在 `run()` 时移动到采集线程，线程退出后归还，可再次 `run()`。

use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use crate::error::{DriverError, TransportError};
use crate::metrics::{CaptureMetrics, CaptureMetricsSnapshot};
use crate::pipeline::{BatchHandler, CaptureConfig, capture_loop};
use crate::transport::{RdtRx, RdtTx, SplittableTransport, UdpTransport};
use axia_protocol::{ControlFrame, RdtCodec};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

type BoxedRx = Box<dyn RdtRx + Send>;
type BoxedTx = Box<dyn RdtTx + Send>;

/// 采集线程退出时归还接收端和退出原因
type CaptureExit = (BoxedRx, Result<(), TransportError>);

/// 带超时的线程 join
trait JoinTimeout<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, DriverError>;
}

impl<T: Send + 'static> JoinTimeout<T> for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, DriverError> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责 join，调用线程只等待有限时间
        std::thread::spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(DriverError::IoThread("capture thread panicked".to_string())),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // 看门狗线程继续等待，进程退出时由系统回收
                Err(DriverError::IoThread("capture thread join timeout".to_string()))
            },
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(DriverError::IoThread("capture thread join watchdog lost".to_string()))
            },
        }
    }
}

/// 采集循环
pub struct CaptureLoop {
    codec: RdtCodec,
    config: CaptureConfig,
    diagnostics: Arc<dyn Diagnostics>,
    metrics: Arc<CaptureMetrics>,
    is_running: Arc<AtomicBool>,
    rx: Option<BoxedRx>,
    tx: Option<BoxedTx>,
    thread: Option<JoinHandle<CaptureExit>>,
}

impl CaptureLoop {
    pub fn new(codec: RdtCodec, config: CaptureConfig) -> Self {
        Self::with_diagnostics(codec, config, Arc::new(TracingDiagnostics))
    }

    pub fn with_diagnostics(
        codec: RdtCodec,
        config: CaptureConfig,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            codec,
            config,
            diagnostics,
            metrics: Arc::new(CaptureMetrics::new()),
            is_running: Arc::new(AtomicBool::new(false)),
            rx: None,
            tx: None,
            thread: None,
        }
    }

    /// 创建连接到传感器端点的 UDP 传输
    pub fn connect(&mut self, endpoint: SocketAddr) -> Result<(), DriverError> {
        let transport = UdpTransport::connect(endpoint, self.config.receive_timeout())?;
        info!(
            "Connected to Axia sensor at {} (local {})",
            transport.peer_addr(),
            transport.local_addr()?
        );
        self.attach(transport)
    }

    /// 使用任意传输（测试中注入 mock 传输）
    pub fn attach<T>(&mut self, transport: T) -> Result<(), DriverError>
    where
        T: SplittableTransport,
        T::Rx: Send + 'static,
        T::Tx: Send + 'static,
    {
        if self.thread.is_some() {
            return Err(DriverError::AlreadyRunning);
        }
        let (rx, tx) = transport.split()?;
        self.rx = Some(Box::new(rx));
        self.tx = Some(Box::new(tx));
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.tx.is_some()
    }

    /// 请求传感器连续发送
    pub fn start_continuous(&mut self) -> Result<(), DriverError> {
        self.send_control(ControlFrame::start_continuous())
    }

    /// 请求传感器发送 `count` 条记录
    pub fn start_n(&mut self, count: u32) -> Result<(), DriverError> {
        self.send_control(ControlFrame::start_n(count))
    }

    /// 请求传感器停止发送
    pub fn stop(&mut self) -> Result<(), DriverError> {
        self.send_control(ControlFrame::stop())
    }

    fn send_control(&mut self, frame: ControlFrame) -> Result<(), DriverError> {
        let tx = self.tx.as_mut().ok_or(DriverError::NotConnected)?;
        let bytes = frame.encode();
        tx.send(&bytes)?;
        self.metrics.control_frames_sent.fetch_add(1, Ordering::Relaxed);
        debug!("Sent control frame {:?}: {}", frame.command, hex::encode(bytes));
        Ok(())
    }

    /// 启动采集线程
    ///
    /// 处理器在采集线程内同步执行（见 [`BatchHandler`]）。
    pub fn run<H>(&mut self, handler: H) -> Result<(), DriverError>
    where
        H: BatchHandler + 'static,
    {
        if self.thread.is_some() {
            return Err(DriverError::AlreadyRunning);
        }
        let mut rx = self.rx.take().ok_or(DriverError::NotConnected)?;

        let codec = self.codec;
        let config = self.config.clone();
        let is_running = self.is_running.clone();
        let metrics = self.metrics.clone();
        let diagnostics = self.diagnostics.clone();

        // Release: 采集线程启动前的写入对其可见
        is_running.store(true, Ordering::Release);

        let spawned = std::thread::Builder::new()
            .name("axia-capture".to_string())
            .spawn(move || {
                let mut handler = handler;
                let result = capture_loop(
                    &mut rx,
                    &codec,
                    &config,
                    &mut handler,
                    &is_running,
                    &metrics,
                    diagnostics.as_ref(),
                );
                (rx, result)
            });

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                debug!("Capture thread started");
                Ok(())
            },
            Err(e) => {
                self.is_running.store(false, Ordering::Release);
                Err(DriverError::IoThread(format!("failed to spawn capture thread: {}", e)))
            },
        }
    }

    /// 结束采集线程并等待其退出（可从任意线程发出停止信号，见 [`CaptureLoop::stop_handle`]）
    ///
    /// 返回采集线程的退出原因：致命传输错误时返回该错误。
    /// 线程未运行时直接返回 `Ok(())`。
    ///
    /// ⚠️ join 超时或线程 panic 时接收端随线程丢失，返回 `IoThread`；
    /// 之后 `run` 返回 `NotConnected`，需要 `connect` / `attach` 新的传输。
    pub fn stop_listening(&mut self) -> Result<(), DriverError> {
        self.is_running.store(false, Ordering::Release);

        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        let (rx, result) = match handle.join_timeout(self.config.join_timeout()) {
            Ok(exit) => exit,
            Err(e) => {
                // 滞留线程保留旧标志（已为 false），新线程使用新标志
                self.is_running = Arc::new(AtomicBool::new(false));
                error!("Capture thread not joined, receive half lost: {}", e);
                return Err(e);
            },
        };
        self.rx = Some(rx);
        debug!("Capture thread joined");
        result.map_err(DriverError::from)
    }

    /// 线程安全的停止信号（只清除运行标志，不等待）
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            is_running: self.is_running.clone(),
        }
    }

    /// 采集线程是否仍在运行
    pub fn is_listening(&self) -> bool {
        self.thread.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// 停止采集线程并释放传输
    pub fn disconnect(&mut self) -> Result<(), DriverError> {
        let result = self.stop_listening();
        self.rx = None;
        self.tx = None;
        debug!("Capture transport released");
        result
    }

    pub fn metrics(&self) -> CaptureMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn codec(&self) -> &RdtCodec {
        &self.codec
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            match handle.join_timeout(self.config.join_timeout()) {
                Ok((_, Err(e))) => warn!("Capture thread exited with error: {}", e),
                Ok(_) => {},
                Err(e) => warn!("Failed to join capture thread on drop: {}", e),
            }
        }
    }
}

/// 从其他线程停止采集循环
#[derive(Clone)]
pub struct StopHandle {
    is_running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.is_running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axia_protocol::RecordBatch;
    use parking_lot::Mutex;

    struct IdleRx;

    impl RdtRx for IdleRx {
        fn receive(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
            std::thread::sleep(Duration::from_millis(5));
            Err(TransportError::Timeout)
        }
    }

    struct SentFrames(Arc<Mutex<Vec<Vec<u8>>>>);

    impl RdtTx for SentFrames {
        fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
            self.0.lock().push(frame.to_vec());
            Ok(())
        }
    }

    struct MockTransport {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl SplittableTransport for MockTransport {
        type Rx = IdleRx;
        type Tx = SentFrames;

        fn split(self) -> Result<(IdleRx, SentFrames), TransportError> {
            Ok((IdleRx, SentFrames(self.sent)))
        }
    }

    fn capture() -> (CaptureLoop, Arc<Mutex<Vec<Vec<u8>>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mut capture = CaptureLoop::new(
            RdtCodec::new(1.0, 1.0).unwrap(),
            CaptureConfig {
                receive_timeout_ms: 5,
                ..Default::default()
            },
        );
        capture
            .attach(MockTransport { sent: sent.clone() })
            .unwrap();
        (capture, sent)
    }

    #[test]
    fn test_not_connected() {
        let mut capture = CaptureLoop::new(RdtCodec::new(1.0, 1.0).unwrap(), CaptureConfig::default());
        assert!(matches!(capture.start_continuous(), Err(DriverError::NotConnected)));
        assert!(matches!(capture.run(|_batch: RecordBatch| {}), Err(DriverError::NotConnected)));
        assert!(capture.stop_listening().is_ok());
    }

    #[test]
    fn test_control_frames_sent() {
        let (mut capture, sent) = capture();
        capture.start_continuous().unwrap();
        capture.start_n(7).unwrap();
        capture.stop().unwrap();

        let sent = sent.lock();
        assert_eq!(sent[0], ControlFrame::start_continuous().encode());
        assert_eq!(sent[1], ControlFrame::start_n(7).encode());
        assert_eq!(sent[2], ControlFrame::stop().encode());
        assert_eq!(capture.metrics().control_frames_sent, 3);
    }

    #[test]
    fn test_run_twice_is_rejected() {
        let (mut capture, _) = capture();
        capture.run(|_batch: RecordBatch| {}).unwrap();
        assert!(capture.is_listening());
        assert!(matches!(capture.run(|_batch: RecordBatch| {}), Err(DriverError::AlreadyRunning)));
        capture.stop_listening().unwrap();
        assert!(!capture.is_listening());
    }

    #[test]
    fn test_restart_after_stop() {
        let (mut capture, _) = capture();
        capture.run(|_batch: RecordBatch| {}).unwrap();
        capture.stop_listening().unwrap();
        // 接收端已归还
        capture.run(|_batch: RecordBatch| {}).unwrap();
        capture.stop_listening().unwrap();
    }

    #[test]
    fn test_stop_handle_from_other_thread() {
        let (mut capture, _) = capture();
        capture.run(|_batch: RecordBatch| {}).unwrap();

        let handle = capture.stop_handle();
        std::thread::spawn(move || handle.stop()).join().unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while capture.is_listening() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!capture.is_listening());
        capture.stop_listening().unwrap();
    }

    /// 接收调用远长于 join 超时
    struct StuckRx;

    impl RdtRx for StuckRx {
        fn receive(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
            std::thread::sleep(Duration::from_millis(300));
            Err(TransportError::Timeout)
        }
    }

    struct StuckTransport;

    impl SplittableTransport for StuckTransport {
        type Rx = StuckRx;
        type Tx = SentFrames;

        fn split(self) -> Result<(StuckRx, SentFrames), TransportError> {
            Ok((StuckRx, SentFrames(Arc::new(Mutex::new(Vec::new())))))
        }
    }

    #[test]
    fn test_join_timeout_requires_new_transport() {
        let mut capture = CaptureLoop::new(
            RdtCodec::new(1.0, 1.0).unwrap(),
            CaptureConfig {
                join_timeout_ms: 20,
                ..Default::default()
            },
        );
        capture.attach(StuckTransport).unwrap();
        capture.run(|_batch: RecordBatch| {}).unwrap();

        assert!(matches!(capture.stop_listening(), Err(DriverError::IoThread(_))));
        assert!(matches!(capture.run(|_batch: RecordBatch| {}), Err(DriverError::NotConnected)));

        capture
            .attach(MockTransport {
                sent: Arc::new(Mutex::new(Vec::new())),
            })
            .unwrap();
        capture.run(|_batch: RecordBatch| {}).unwrap();
        capture.stop_listening().unwrap();
    }

    #[test]
    fn test_disconnect_releases_transport() {
        let (mut capture, _) = capture();
        capture.run(|_batch: RecordBatch| {}).unwrap();
        capture.disconnect().unwrap();
        assert!(!capture.is_connected());
        assert!(matches!(capture.stop(), Err(DriverError::NotConnected)));
    }
}
