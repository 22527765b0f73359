//! # 去偏置
//!
//! 偏置向量整体替换（`ArcSwap`），每个批次开始时读取一次：
//! 控制线程可以在采集过程中调用 `set_bias`，
//! 同一批次内的所有记录总是使用同一个偏置。

use arc_swap::ArcSwap;
use axia_protocol::{MeasurementRecord, RecordBatch};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// 偏置计算错误
#[derive(Error, Debug)]
pub enum BiasError {
    #[error("Bias source must be a .csv file: {0}")]
    NotCsv(PathBuf),

    #[error("Failed to read bias CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line}: expected 7 columns (sequence + 6 values), got {columns}")]
    InvalidRow { line: u64, columns: usize },

    #[error("Line {line}: invalid value `{value}`")]
    InvalidValue { line: u64, value: String },

    #[error("Bias CSV contains no records")]
    Empty,
}

/// 偏置向量 `[Fx, Fy, Fz, Tx, Ty, Tz]`（物理单位）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BiasVector([f64; 6]);

impl BiasVector {
    pub const ZERO: Self = Self([0.0; 6]);

    pub const fn new(values: [f64; 6]) -> Self {
        Self(values)
    }

    pub fn values(&self) -> [f64; 6] {
        self.0
    }

    pub fn negated(&self) -> Self {
        Self(self.0.map(|v| -v))
    }

    /// 对录制的 CSV 文件（`sequence,Fx,Fy,Fz,Tx,Ty,Tz`，无表头）逐列求均值
    ///
    /// 第一列（序号）被忽略。
    pub fn average_from_csv<P: AsRef<Path>>(path: P) -> Result<Self, BiasError> {
        let path = path.as_ref();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(BiasError::NotCsv(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut sum = [0.0f64; 6];
        let mut count = 0u64;
        for (index, row) in reader.records().enumerate() {
            let row = row?;
            let line = index as u64 + 1;
            if row.len() != 7 {
                return Err(BiasError::InvalidRow {
                    line,
                    columns: row.len(),
                });
            }
            for (acc, field) in sum.iter_mut().zip(row.iter().skip(1)) {
                let value: f64 = field.trim().parse().map_err(|_| BiasError::InvalidValue {
                    line,
                    value: field.to_string(),
                })?;
                *acc += value;
            }
            count += 1;
        }

        if count == 0 {
            return Err(BiasError::Empty);
        }

        let bias = Self(sum.map(|s| s / count as f64));
        debug!("Averaged bias over {} records from {}: {:?}", count, path.display(), bias);
        Ok(bias)
    }
}

impl From<[f64; 6]> for BiasVector {
    fn from(values: [f64; 6]) -> Self {
        Self(values)
    }
}

/// 去偏置器
#[derive(Debug)]
pub struct Unbiaser {
    bias: Arc<ArcSwap<BiasVector>>,
}

impl Unbiaser {
    pub fn new(bias: BiasVector) -> Self {
        Self {
            bias: Arc::new(ArcSwap::from_pointee(bias)),
        }
    }

    pub fn bias(&self) -> BiasVector {
        **self.bias.load()
    }

    /// 整体替换偏置（下一个批次生效）
    pub fn set_bias(&self, bias: BiasVector) {
        self.bias.store(Arc::new(bias));
    }

    /// 可跨线程持有的偏置替换句柄
    pub fn handle(&self) -> BiasHandle {
        BiasHandle {
            bias: self.bias.clone(),
        }
    }

    /// 从批次中减去偏置
    pub fn apply(&self, mut batch: RecordBatch) -> RecordBatch {
        let bias = self.bias();
        for record in batch.iter_mut() {
            subtract(record, &bias);
        }
        batch
    }

    /// 从单条记录中减去偏置
    pub fn apply_record(&self, mut record: MeasurementRecord) -> MeasurementRecord {
        subtract(&mut record, &self.bias());
        record
    }
}

impl Default for Unbiaser {
    fn default() -> Self {
        Self::new(BiasVector::ZERO)
    }
}

fn subtract(record: &mut MeasurementRecord, bias: &BiasVector) {
    let mut values = record.values();
    for (value, b) in values.iter_mut().zip(bias.0) {
        *value -= b;
    }
    record.set_values(values);
}

/// 偏置替换句柄
#[derive(Debug, Clone)]
pub struct BiasHandle {
    bias: Arc<ArcSwap<BiasVector>>,
}

impl BiasHandle {
    pub fn bias(&self) -> BiasVector {
        **self.bias.load()
    }

    pub fn set_bias(&self, bias: BiasVector) {
        self.bias.store(Arc::new(bias));
    }
}
