//! 去偏置与滤波器的属性测试

use axia_protocol::{MeasurementRecord, RecordBatch};
use axia_tools::{BiasVector, Filter, FilterKind, Unbiaser};
use proptest::prelude::*;

fn values() -> impl Strategy<Value = [f64; 6]> {
    prop::array::uniform6(-1.0e4..1.0e4f64)
}

fn batch_strategy() -> impl Strategy<Value = RecordBatch> {
    (any::<u32>(), prop::collection::vec(values(), 1..40)).prop_map(|(start, rows)| {
        rows.into_iter()
            .enumerate()
            .map(|(i, values)| {
                MeasurementRecord {
                    rdt_sequence: start.wrapping_add(i as u32),
                    ft_sequence: start.wrapping_add(i as u32),
                    status: 0,
                    ..Default::default()
                }
                .with_values(values)
            })
            .collect()
    })
}

proptest! {
    /// 减去偏置后再减去负偏置，恢复原始值（允许浮点舍入）
    #[test]
    fn unbias_then_negated_unbias_roundtrips(batch in batch_strategy(), bias in values()) {
        let bias = BiasVector::new(bias);
        let forward = Unbiaser::new(bias);
        let backward = Unbiaser::new(bias.negated());

        let restored = backward.apply(forward.apply(batch.clone()));
        prop_assert_eq!(restored.len(), batch.len());
        for (r, o) in restored.iter().zip(batch.iter()) {
            prop_assert_eq!(r.ft_sequence, o.ft_sequence);
            for (a, b) in r.values().iter().zip(o.values()) {
                prop_assert!((a - b).abs() <= 1e-9 * (1.0 + b.abs()));
            }
        }
    }

    /// 滑动平均和指数滤波器的输出长度等于输入长度，标识字段不变
    #[test]
    fn length_preserving_filters_keep_identifiers(
        batches in prop::collection::vec(batch_strategy(), 1..6),
        window in 1usize..16,
        alpha in 0.01..=1.0f64,
    ) {
        let kinds = [
            FilterKind::MovingAverage { window },
            FilterKind::Exponential { window, alpha },
        ];
        for kind in kinds {
            let mut filter = Filter::new(kind).unwrap();
            for batch in &batches {
                let out = filter.filter(batch.clone());
                prop_assert_eq!(out.len(), batch.len());
                for (o, i) in out.iter().zip(batch.iter()) {
                    prop_assert_eq!(o.ft_sequence, i.ft_sequence);
                    prop_assert_eq!(o.rdt_sequence, i.rdt_sequence);
                }
            }
        }
    }

    /// Savitzky-Golay 每个分块返回整个窗口，每条输入都被转发，最后一行是最新输入
    #[test]
    fn savitzky_golay_returns_window(
        batches in prop::collection::vec(batch_strategy(), 1..6),
        half in 1usize..8,
    ) {
        let window = 2 * half + 1;
        let mut filter = Filter::new(FilterKind::SavitzkyGolay { window, order: half.min(3) }).unwrap();
        for batch in &batches {
            let out = filter.filter(batch.clone());
            prop_assert_eq!(out.len(), batch.len().div_ceil(window) * window);
            for record in batch.iter() {
                prop_assert!(out.iter().any(|r| r.ft_sequence == record.ft_sequence));
            }
            prop_assert_eq!(
                out.last().map(|r| r.ft_sequence),
                batch.last().map(|r| r.ft_sequence)
            );
        }
    }

    /// 滤波输出保持在输入范围内（滑动平均为凸组合）
    #[test]
    fn moving_average_is_bounded(batch in batch_strategy(), window in 1usize..16) {
        let mut filter = Filter::new(FilterKind::MovingAverage { window }).unwrap();
        let min = batch.iter().map(|r| r.fx).fold(f64::INFINITY, f64::min);
        let max = batch.iter().map(|r| r.fx).fold(f64::NEG_INFINITY, f64::max);
        for row in filter.filter(batch).iter() {
            prop_assert!(row.fx >= min - 1e-9 && row.fx <= max + 1e-9);
        }
    }
}
