//! # Axia Driver
//!
//! Axia 传感器 RDT 数据流采集层：UDP 传输、采集线程、序列号完整性检测。
//!
//! ## 线程模型
//!
//! 每个 [`CaptureLoop`] 恰好一个采集线程：接收 → 解码 → 内联调用 [`BatchHandler`]。
//! 控制线程只负责发送控制帧和翻转运行标志。
//!
//! ## 使用示例
//!
//! ```no_run
//! use axia_driver::{CaptureConfig, CaptureLoop};
//! use axia_protocol::{RdtCodec, RecordBatch};
//!
//! let codec = RdtCodec::new(1_000_000.0, 1_000_000.0)?;
//! let mut capture = CaptureLoop::new(codec, CaptureConfig::default());
//! capture.connect("192.168.1.1:49152".parse()?)?;
//! capture.run(|batch: RecordBatch| println!("{} records", batch.len()))?;
//! capture.start_continuous()?;
//! // ...
//! capture.stop()?;
//! capture.stop_listening()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod capture;
pub mod diagnostics;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod sequence;
pub mod transport;

pub use capture::{CaptureLoop, StopHandle};
pub use diagnostics::{Diagnostics, NoopDiagnostics, TracingDiagnostics};
pub use error::{DriverError, TransportError};
pub use metrics::{CaptureMetrics, CaptureMetricsSnapshot};
pub use pipeline::{BatchHandler, CaptureConfig, capture_loop};
pub use sequence::SequenceMonitor;
pub use transport::{RdtRx, RdtTx, SplittableTransport, UdpRx, UdpTransport, UdpTx};
