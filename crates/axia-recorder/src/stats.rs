//! 录制统计
//!
//! 计数器由采集线程写入，控制线程随时读取快照（无需等待批次处理完成）。

use axia_driver::CaptureMetricsSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};

/// 单个输出的计数器
#[derive(Debug)]
pub(crate) struct SinkCounters {
    pub name: String,
    pub batches_written: AtomicU64,
    pub failures: AtomicU64,
}

impl SinkCounters {
    pub fn new(name: String) -> Self {
        Self {
            name,
            batches_written: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }
}

/// 条件化流水线计数器
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub batches: AtomicU64,
    pub records_in: AtomicU64,
    pub records_out: AtomicU64,
    pub records_lost: AtomicU64,
    pub batches_skipped: AtomicU64,
    pub sinks: Vec<SinkCounters>,
}

impl PipelineCounters {
    pub fn new(sink_names: impl IntoIterator<Item = String>) -> Self {
        Self {
            sinks: sink_names.into_iter().map(SinkCounters::new).collect(),
            ..Default::default()
        }
    }

    pub fn snapshot(&self, capture: CaptureMetricsSnapshot) -> RecorderStats {
        RecorderStats {
            batches: self.batches.load(Ordering::Relaxed),
            records_in: self.records_in.load(Ordering::Relaxed),
            records_out: self.records_out.load(Ordering::Relaxed),
            records_lost: self.records_lost.load(Ordering::Relaxed),
            batches_skipped: self.batches_skipped.load(Ordering::Relaxed),
            sinks: self
                .sinks
                .iter()
                .map(|sink| SinkStats {
                    name: sink.name.clone(),
                    batches_written: sink.batches_written.load(Ordering::Relaxed),
                    failures: sink.failures.load(Ordering::Relaxed),
                })
                .collect(),
            capture,
        }
    }
}

/// 录制统计快照
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderStats {
    /// 录制期间处理的批次
    pub batches: u64,
    /// 进入流水线的记录
    pub records_in: u64,
    /// 滤波后转发给输出的记录（Savitzky-Golay 时大于输入）
    pub records_out: u64,
    /// 序列号检测计入的丢失
    pub records_lost: u64,
    /// 未录制时收到并丢弃的批次
    pub batches_skipped: u64,
    pub sinks: Vec<SinkStats>,
    pub capture: CaptureMetricsSnapshot,
}

impl RecorderStats {
    pub fn sink_failures(&self) -> u64 {
        self.sinks.iter().map(|sink| sink.failures).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStats {
    pub name: String,
    pub batches_written: u64,
    pub failures: u64,
}
