//! 条件化流水线
//!
//! 每个批次依次经过：去偏置 → 序列号检测 → 可选滤波 → 所有输出。
//! 序列号检测在滤波之前进行，作用于真实的序列号。

use crate::stats::PipelineCounters;
use axia_driver::SequenceMonitor;
use axia_protocol::RecordBatch;
use axia_tools::{Filter, Sink, SinkError, Unbiaser};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{debug, error};

/// 单个批次的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// 序列号检测计入的丢失
    pub lost: u64,
    /// 转发给输出的记录数
    pub forwarded: usize,
    /// 本批次写入失败的输出数
    pub failed_sinks: usize,
}

pub struct ConditioningPipeline {
    unbiaser: Unbiaser,
    monitor: SequenceMonitor,
    filter: Option<Filter>,
    sinks: Vec<Box<dyn Sink>>,
    counters: Arc<PipelineCounters>,
}

impl ConditioningPipeline {
    pub fn new(
        unbiaser: Unbiaser,
        monitor: SequenceMonitor,
        filter: Option<Filter>,
        sinks: Vec<Box<dyn Sink>>,
    ) -> Self {
        let counters = Arc::new(PipelineCounters::new(
            sinks.iter().map(|sink| sink.name().to_string()),
        ));
        Self {
            unbiaser,
            monitor,
            filter,
            sinks,
            counters,
        }
    }

    pub(crate) fn counters(&self) -> Arc<PipelineCounters> {
        self.counters.clone()
    }

    /// 处理一个批次
    ///
    /// 输出失败不会中断其它输出，也不会中断数据流；
    /// 每个输出的第 1 次及每第 1000 次失败以 `error!` 记录。
    pub fn process(&mut self, batch: RecordBatch) -> BatchReport {
        let counters = &self.counters;
        counters.batches.fetch_add(1, Ordering::Relaxed);
        counters.records_in.fetch_add(batch.len() as u64, Ordering::Relaxed);

        let batch = self.unbiaser.apply(batch);

        let lost = self.monitor.observe(&batch);
        if lost > 0 {
            counters.records_lost.fetch_add(lost, Ordering::Relaxed);
        }

        let batch = match self.filter.as_mut() {
            Some(filter) => filter.filter(batch),
            None => batch,
        };
        counters.records_out.fetch_add(batch.len() as u64, Ordering::Relaxed);

        let mut failed_sinks = 0;
        for (sink, sink_counters) in self.sinks.iter_mut().zip(&counters.sinks) {
            match sink.append(&batch) {
                Ok(()) => {
                    sink_counters.batches_written.fetch_add(1, Ordering::Relaxed);
                },
                Err(e) => {
                    failed_sinks += 1;
                    let failures = sink_counters.failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if failures == 1 || failures % 1000 == 0 {
                        error!(
                            "Sink {} failed to append batch ({} failure(s) so far): {}",
                            sink.name(),
                            failures,
                            e
                        );
                    }
                },
            }
        }

        BatchReport {
            lost,
            forwarded: batch.len(),
            failed_sinks,
        }
    }

    /// 新的一次采集：清除序列号状态和滤波窗口
    pub fn reset_stream(&mut self) {
        self.monitor.reset();
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
        debug!("Conditioning pipeline stream state reset");
    }

    /// 关闭所有输出，返回每个失败输出的名称和错误
    pub fn close_sinks(&mut self) -> Vec<(String, SinkError)> {
        let mut failures = Vec::new();
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.close() {
                error!("Failed to close sink {}: {}", sink.name(), e);
                failures.push((sink.name().to_string(), e));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axia_protocol::MeasurementRecord;
    use axia_tools::{BiasVector, FilterKind};
    use parking_lot::Mutex;

    /// 把批次保存在共享 Vec 中；`fail` 为真时返回错误
    struct MemorySink {
        name: &'static str,
        batches: Arc<Mutex<Vec<RecordBatch>>>,
        fail: bool,
        closed: Arc<Mutex<u32>>,
    }

    impl MemorySink {
        fn new(name: &'static str, fail: bool) -> (Self, Arc<Mutex<Vec<RecordBatch>>>) {
            let batches = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    name,
                    batches: batches.clone(),
                    fail,
                    closed: Arc::new(Mutex::new(0)),
                },
                batches,
            )
        }
    }

    impl Sink for MemorySink {
        fn name(&self) -> &str {
            self.name
        }

        fn append(&mut self, batch: &RecordBatch) -> Result<(), SinkError> {
            if self.fail {
                return Err(SinkError::Closed(self.name.to_string()));
            }
            self.batches.lock().push(batch.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<(), SinkError> {
            *self.closed.lock() += 1;
            Ok(())
        }
    }

    fn batch(sequences: &[u32], fx: f64) -> RecordBatch {
        sequences
            .iter()
            .map(|&ft_sequence| {
                MeasurementRecord {
                    ft_sequence,
                    ..Default::default()
                }
                .with_values([fx, 0.0, 0.0, 0.0, 0.0, 0.0])
            })
            .collect()
    }

    #[test]
    fn test_unbias_before_sinks() {
        let (sink, batches) = MemorySink::new("memory", false);
        let mut pipeline = ConditioningPipeline::new(
            Unbiaser::new(BiasVector::new([1.0, 0.0, 0.0, 0.0, 0.0, 0.0])),
            SequenceMonitor::new(),
            None,
            vec![Box::new(sink)],
        );

        let report = pipeline.process(batch(&[1, 2], 5.0));
        assert_eq!(report.forwarded, 2);
        assert_eq!(batches.lock()[0][0].fx, 4.0);
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let (bad, _) = MemorySink::new("bad", true);
        let (good, batches) = MemorySink::new("good", false);
        let mut pipeline = ConditioningPipeline::new(
            Unbiaser::default(),
            SequenceMonitor::new(),
            None,
            vec![Box::new(bad), Box::new(good)],
        );

        for start in [0u32, 2, 4] {
            let report = pipeline.process(batch(&[start, start + 1], 1.0));
            assert_eq!(report.failed_sinks, 1);
        }
        assert_eq!(batches.lock().len(), 3);

        let stats = pipeline.counters().snapshot(Default::default());
        assert_eq!(stats.sinks[0].name, "bad");
        assert_eq!(stats.sinks[0].failures, 3);
        assert_eq!(stats.sinks[1].batches_written, 3);
        assert_eq!(stats.sink_failures(), 3);
    }

    #[test]
    fn test_loss_counted_on_unfiltered_stream() {
        let (sink, batches) = MemorySink::new("memory", false);
        let mut pipeline = ConditioningPipeline::new(
            Unbiaser::default(),
            SequenceMonitor::new(),
            Some(Filter::new(FilterKind::DEFAULT_SAVITZKY_GOLAY).unwrap()),
            vec![Box::new(sink)],
        );

        pipeline.process(batch(&[10, 11, 12], 1.0));
        let report = pipeline.process(batch(&[14, 15], 1.0));
        assert_eq!(report.lost, 1);
        // Savitzky-Golay 输出整个窗口
        assert_eq!(report.forwarded, 11);
        assert_eq!(batches.lock()[1].len(), 11);

        let stats = pipeline.counters().snapshot(Default::default());
        assert_eq!(stats.records_in, 5);
        assert_eq!(stats.records_out, 22);
        assert_eq!(stats.records_lost, 1);
    }

    #[test]
    fn test_savitzky_golay_forwards_long_batches() {
        let (sink, batches) = MemorySink::new("memory", false);
        let mut pipeline = ConditioningPipeline::new(
            Unbiaser::default(),
            SequenceMonitor::new(),
            Some(Filter::new(FilterKind::SavitzkyGolay { window: 5, order: 2 }).unwrap()),
            vec![Box::new(sink)],
        );

        let sequences: Vec<u32> = (0..12).collect();
        let report = pipeline.process(batch(&sequences, 1.0));
        assert_eq!(report.lost, 0);
        assert_eq!(report.forwarded, 15);

        let forwarded = &batches.lock()[0];
        for seq in sequences {
            assert!(forwarded.iter().any(|r| r.ft_sequence == seq));
        }
    }

    #[test]
    fn test_reset_stream_and_close() {
        let (sink, _) = MemorySink::new("memory", false);
        let closed = sink.closed.clone();
        let mut pipeline = ConditioningPipeline::new(
            Unbiaser::default(),
            SequenceMonitor::new(),
            Some(Filter::new(FilterKind::DEFAULT_MOVING_AVERAGE).unwrap()),
            vec![Box::new(sink)],
        );

        pipeline.process(batch(&[1], 1.0));
        pipeline.reset_stream();
        assert_eq!(pipeline.process(batch(&[100], 1.0)).lost, 0);

        assert!(pipeline.close_sinks().is_empty());
        assert_eq!(*closed.lock(), 1);
    }
}
