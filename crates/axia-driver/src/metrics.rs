//! 采集线程性能指标
//!
//! 所有计数器使用 `Ordering::Relaxed` 原子操作，采集线程写、任意线程读。

use std::sync::atomic::{AtomicU64, Ordering};

/// 采集指标（原子计数器）
#[derive(Debug, Default)]
pub struct CaptureMetrics {
    /// 收到的数据报总数
    pub datagrams: AtomicU64,
    /// 解码出的记录总数
    pub records: AtomicU64,
    /// 不足一条记录（< 36 字节）的数据报
    pub runt_datagrams: AtomicU64,
    /// 因不足一条记录而丢弃的尾部字节
    pub trailing_bytes: AtomicU64,
    /// 接收超时次数（正常现象）
    pub receive_timeouts: AtomicU64,
    /// 非致命传输故障（如 ICMP port unreachable）
    pub transport_faults: AtomicU64,
    /// 已发送的控制帧
    pub control_frames_sent: AtomicU64,
}

impl CaptureMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取一致性快照（各字段独立读取，非原子整体）
    pub fn snapshot(&self) -> CaptureMetricsSnapshot {
        CaptureMetricsSnapshot {
            datagrams: self.datagrams.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            runt_datagrams: self.runt_datagrams.load(Ordering::Relaxed),
            trailing_bytes: self.trailing_bytes.load(Ordering::Relaxed),
            receive_timeouts: self.receive_timeouts.load(Ordering::Relaxed),
            transport_faults: self.transport_faults.load(Ordering::Relaxed),
            control_frames_sent: self.control_frames_sent.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureMetricsSnapshot {
    pub datagrams: u64,
    pub records: u64,
    pub runt_datagrams: u64,
    pub trailing_bytes: u64,
    pub receive_timeouts: u64,
    pub transport_faults: u64,
    pub control_frames_sent: u64,
}

impl CaptureMetricsSnapshot {
    /// 平均每个数据报的记录数
    pub fn records_per_datagram(&self) -> f64 {
        if self.datagrams == 0 {
            0.0
        } else {
            self.records as f64 / self.datagrams as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = CaptureMetrics::new();
        metrics.datagrams.fetch_add(4, Ordering::Relaxed);
        metrics.records.fetch_add(10, Ordering::Relaxed);
        metrics.trailing_bytes.fetch_add(3, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.datagrams, 4);
        assert_eq!(snapshot.records, 10);
        assert_eq!(snapshot.trailing_bytes, 3);
        assert_eq!(snapshot.records_per_datagram(), 2.5);

        assert_eq!(CaptureMetrics::new().snapshot(), CaptureMetricsSnapshot::default());
        assert_eq!(CaptureMetricsSnapshot::default().records_per_datagram(), 0.0);
    }
}
