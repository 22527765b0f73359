//! 诊断输出
//!
//! 丢包和传输故障不是错误，只需要报告。核心逻辑通过注入的
//! [`Diagnostics`] 报告，默认实现 [`TracingDiagnostics`] 转发到 `tracing`。

use crate::error::TransportError;
use tracing::{trace, warn};

/// 诊断事件接收者
///
/// ⚠️ 所有方法都在采集线程内调用，必须快速返回。
pub trait Diagnostics: Send + Sync {
    /// 检测到丢失记录
    ///
    /// - `lost`: 本批次计入的丢失数量（> 0）
    /// - `last_seen`: 上一批次最后一条记录的 `ft_sequence`
    /// - `first`: 本批次第一条记录的 `ft_sequence`
    fn records_lost(&self, lost: u64, last_seen: Option<u32>, first: u32);

    /// 采集线程遇到非致命传输故障
    fn transport_fault(&self, error: &TransportError) {
        let _ = error;
    }

    /// 收到一个非空批次
    fn batch_received(&self, records: usize) {
        let _ = records;
    }
}

/// 转发到 `tracing` 的默认诊断实现
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn records_lost(&self, lost: u64, last_seen: Option<u32>, first: u32) {
        match last_seen {
            Some(last) => warn!(
                "Lost {} RDT record(s): last seen ft_sequence {}, batch starts at {}",
                lost, last, first
            ),
            None => warn!("Lost {} RDT record(s) inside batch starting at {}", lost, first),
        }
    }

    fn transport_fault(&self, error: &TransportError) {
        warn!("Capture transport fault: {}", error);
    }

    fn batch_received(&self, records: usize) {
        trace!("Received batch of {} record(s)", records);
    }
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl Diagnostics for NoopDiagnostics {
    fn records_lost(&self, _lost: u64, _last_seen: Option<u32>, _first: u32) {}
}
