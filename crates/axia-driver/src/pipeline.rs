//! 采集线程主循环
//!
//! 接收 → 解码 → 内联调用处理器 → 下一次接收。
//! 循环内部没有队列：处理器的耗时直接决定采集吞吐。

use crate::diagnostics::Diagnostics;
use crate::error::TransportError;
use crate::metrics::CaptureMetrics;
use crate::transport::RdtRx;
use axia_protocol::{RECORD_SIZE, RdtCodec, RecordBatch, trailing_bytes};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, trace};

/// 采集配置
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// 接收超时（毫秒），也是停止信号的最大响应延迟
    pub receive_timeout_ms: u64,
    /// 停止时等待采集线程退出的最长时间（毫秒）
    pub join_timeout_ms: u64,
    /// 传感器每个数据报打包的记录数（决定接收缓冲区大小）
    pub records_per_packet: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 100,
            join_timeout_ms: 2000,
            records_per_packet: 1,
        }
    }
}

impl CaptureConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    /// 接收缓冲区大小：向上取整到 1 KiB，且至少多留 1 KiB
    pub fn receive_buffer_len(&self) -> usize {
        (1 + RECORD_SIZE * self.records_per_packet / 1024) * 1024
    }
}

/// 批次处理器
///
/// ⚠️ `on_batch` 在采集线程内同步执行，执行期间不会接收新的数据报。
/// 处理器越慢，内核接收缓冲区越容易溢出（表现为序列号丢失）。
pub trait BatchHandler: Send {
    /// 处理一个非空批次（按到达顺序）
    fn on_batch(&mut self, batch: RecordBatch);

    /// 采集线程因致命传输错误即将退出
    fn on_fault(&mut self, error: &TransportError) {
        let _ = error;
    }
}

impl<F> BatchHandler for F
where
    F: FnMut(RecordBatch) + Send,
{
    fn on_batch(&mut self, batch: RecordBatch) {
        self(batch)
    }
}

/// 采集线程主循环
///
/// 每个循环开始时检查 `is_running`；停止信号最迟在一个接收超时后生效。
/// 致命传输错误时将 `is_running` 置为 false 并返回该错误。
///
/// # 参数
/// - `rx`: 接收端
/// - `codec`: 记录解码与换算
/// - `config`: 采集配置
/// - `handler`: 批次处理器
/// - `is_running`: 运行标志
/// - `metrics`: 采集指标
/// - `diagnostics`: 诊断输出
pub fn capture_loop<R, H>(
    rx: &mut R,
    codec: &RdtCodec,
    config: &CaptureConfig,
    handler: &mut H,
    is_running: &AtomicBool,
    metrics: &CaptureMetrics,
    diagnostics: &dyn Diagnostics,
) -> Result<(), TransportError>
where
    R: RdtRx + ?Sized,
    H: BatchHandler + ?Sized,
{
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        use tracing::{info, warn};

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => info!("Capture thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "Failed to set capture thread priority: {:?}. \
                On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                e
            ),
        }
    }

    let mut buf = vec![0u8; config.receive_buffer_len()];

    loop {
        // Acquire: 看到 false 时必须同时看到控制线程在此之前的写入
        if !is_running.load(Ordering::Acquire) {
            trace!("Capture thread: is_running flag is false, exiting");
            break;
        }

        let len = match rx.receive(&mut buf) {
            Ok(len) => len,
            Err(TransportError::Timeout) => {
                metrics.receive_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) if !e.is_fatal() => {
                metrics.transport_faults.fetch_add(1, Ordering::Relaxed);
                diagnostics.transport_fault(&e);
                continue;
            },
            Err(e) => {
                error!("Capture thread: fatal receive error: {}", e);
                metrics.transport_faults.fetch_add(1, Ordering::Relaxed);
                diagnostics.transport_fault(&e);
                handler.on_fault(&e);
                // Release: 控制线程看到 false 时能看到此前的全部写入
                is_running.store(false, Ordering::Release);
                return Err(e);
            },
        };

        metrics.datagrams.fetch_add(1, Ordering::Relaxed);
        let trailing = trailing_bytes(len);
        if trailing > 0 {
            metrics.trailing_bytes.fetch_add(trailing as u64, Ordering::Relaxed);
        }

        let batch = codec.decode_packet(&buf[..len]);
        if batch.is_empty() {
            trace!("Capture thread: runt datagram of {} bytes ignored", len);
            metrics.runt_datagrams.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        metrics.records.fetch_add(batch.len() as u64, Ordering::Relaxed);
        diagnostics.batch_received(batch.len());
        handler.on_batch(batch);
    }

    trace!("Capture thread: loop exited");
    Ok(())
}
