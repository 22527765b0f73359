//! 序列号完整性检测
//!
//! 传感器为每条记录分配单调递增（模 2^32）的 `ft_sequence`。
//! 无丢包时相邻记录的序列号恰好相差 1。

use crate::diagnostics::{Diagnostics, TracingDiagnostics};
use axia_protocol::MeasurementRecord;
use std::sync::Arc;

/// 流状态与累计统计
pub struct SequenceMonitor {
    last_seen: Option<u32>,
    total_lost: u64,
    batches_observed: u64,
    diagnostics: Arc<dyn Diagnostics>,
}

impl SequenceMonitor {
    pub fn new() -> Self {
        Self::with_diagnostics(Arc::new(TracingDiagnostics))
    }

    pub fn with_diagnostics(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            last_seen: None,
            total_lost: 0,
            batches_observed: 0,
            diagnostics,
        }
    }

    /// 检查一个批次，返回本批次计入的丢失数量
    ///
    /// 1. 批次间：期望 `last_seen + 1`（模 2^32），与批次首条记录比较；
    /// 2. 批次内：相邻记录差值不为 1 时计 1 次丢失事件（不按缺口大小计数）；
    /// 3. 更新 `last_seen` 为批次最后一条记录。
    ///
    /// 空批次返回 0 且不改变状态。
    pub fn observe(&mut self, batch: &[MeasurementRecord]) -> u64 {
        let (first, last) = match (batch.first(), batch.last()) {
            (Some(first), Some(last)) => (first.ft_sequence, last.ft_sequence),
            _ => return 0,
        };

        let mut lost = 0u64;

        if let Some(last_seen) = self.last_seen {
            let expected = last_seen.wrapping_add(1);
            lost += if first < expected {
                // 序列号回绕：2^32 - expected + first
                (1u64 << 32) - u64::from(expected) + u64::from(first)
            } else {
                u64::from(first - expected)
            };
        }

        lost += batch
            .windows(2)
            .filter(|pair| pair[1].ft_sequence.wrapping_sub(pair[0].ft_sequence) != 1)
            .count() as u64;

        if lost > 0 {
            self.diagnostics.records_lost(lost, self.last_seen, first);
        }

        self.last_seen = Some(last);
        self.total_lost += lost;
        self.batches_observed += 1;
        lost
    }

    pub fn last_seen(&self) -> Option<u32> {
        self.last_seen
    }

    pub fn total_lost(&self) -> u64 {
        self.total_lost
    }

    pub fn batches_observed(&self) -> u64 {
        self.batches_observed
    }

    /// 清除流状态（新的一次采集不与上一次比较）
    pub fn reset(&mut self) {
        self.last_seen = None;
    }
}

impl Default for SequenceMonitor {
    fn default() -> Self {
        Self::new()
    }
}
