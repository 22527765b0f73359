//! # 流式滤波器
//!
//! 三种滤波器共用同一个窗口规则（[`FilterWindow`]）：
//! - 第一个批次：行 `[0, L - n)` 用批次第一行填充，批次写入末尾 `n` 行；
//! - 之后的批次：窗口左移 `n` 行，批次写入末尾 `n` 行。
//!
//! 只有六个测量值参与计算，`rdt_sequence` / `ft_sequence` / `status` 原样透传。
//! 批次长于窗口时按不超过 `L` 行的块依次处理。
//!
//! | 滤波器 | 输出长度 |
//! |--------|----------|
//! | 滑动平均 | 输入批次长度（每行为窗口均值） |
//! | 指数 | 输入批次长度 |
//! | Savitzky-Golay | 整个窗口（`L` 行） |

use crate::savgol::{mirror_index, savgol_coefficients};
use axia_protocol::{MeasurementRecord, RecordBatch};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 滤波器参数错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Filter window length must be at least 1, got {0}")]
    InvalidWindow(usize),

    #[error("Exponential filter alpha must be in (0, 1], got {0}")]
    InvalidAlpha(f64),

    #[error("Savitzky-Golay window length must be odd, got {0}")]
    EvenWindow(usize),

    #[error("Savitzky-Golay order {order} must be less than window length {window}")]
    OrderTooHigh { order: usize, window: usize },

    #[error("Savitzky-Golay fit is singular for window {window}, order {order}")]
    Singular { window: usize, order: usize },
}

/// 滤波器类型与参数（可从配置文件 / 命令行选择）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FilterKind {
    MovingAverage { window: usize },
    Exponential { window: usize, alpha: f64 },
    SavitzkyGolay { window: usize, order: usize },
}

impl FilterKind {
    pub const DEFAULT_MOVING_AVERAGE: Self = Self::MovingAverage { window: 5 };
    pub const DEFAULT_EXPONENTIAL: Self = Self::Exponential {
        window: 5,
        alpha: 0.5,
    };
    pub const DEFAULT_SAVITZKY_GOLAY: Self = Self::SavitzkyGolay {
        window: 11,
        order: 3,
    };

    pub fn window(&self) -> usize {
        match *self {
            Self::MovingAverage { window }
            | Self::Exponential { window, .. }
            | Self::SavitzkyGolay { window, .. } => window,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::MovingAverage { .. } => "moving-average",
            Self::Exponential { .. } => "exponential",
            Self::SavitzkyGolay { .. } => "savitzky-golay",
        }
    }

    pub fn validate(&self) -> Result<(), FilterError> {
        let window = self.window();
        if window == 0 {
            return Err(FilterError::InvalidWindow(window));
        }
        match *self {
            Self::MovingAverage { .. } => Ok(()),
            Self::Exponential { alpha, .. } => {
                if alpha > 0.0 && alpha <= 1.0 {
                    Ok(())
                } else {
                    Err(FilterError::InvalidAlpha(alpha))
                }
            },
            Self::SavitzkyGolay { order, .. } => {
                if window % 2 == 0 {
                    Err(FilterError::EvenWindow(window))
                } else if order >= window {
                    Err(FilterError::OrderTooHigh { order, window })
                } else {
                    Ok(())
                }
            },
        }
    }
}

/// 最近 `L` 行的滑动窗口
///
/// 第一次写入时分配，之后原地移位复用。
#[derive(Debug, Clone)]
pub struct FilterWindow {
    capacity: usize,
    rows: Vec<MeasurementRecord>,
}

impl FilterWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rows: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_primed(&self) -> bool {
        !self.rows.is_empty()
    }

    /// 写入一个块（`1 <= chunk.len() <= capacity`）
    pub fn push(&mut self, chunk: &[MeasurementRecord]) {
        let n = chunk.len();
        debug_assert!(n >= 1 && n <= self.capacity);
        let Some(&first) = chunk.first() else {
            return;
        };

        if self.rows.is_empty() {
            self.rows = vec![first; self.capacity];
        } else {
            self.rows.rotate_left(n);
        }
        let start = self.capacity - n;
        self.rows[start..].copy_from_slice(chunk);
    }

    pub fn rows(&self) -> &[MeasurementRecord] {
        &self.rows
    }

    /// 末尾 `n` 行
    pub fn tail(&self, n: usize) -> &[MeasurementRecord] {
        &self.rows[self.rows.len() - n..]
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

/// 滑动平均
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: FilterWindow,
}

impl MovingAverage {
    fn process(&mut self, chunk: &[MeasurementRecord], out: &mut RecordBatch) {
        self.window.push(chunk);
        let rows = self.window.rows();

        // "valid" 模式卷积只有一个输出点：窗口均值
        let mut mean = [0.0f64; 6];
        for row in rows {
            for (acc, value) in mean.iter_mut().zip(row.values()) {
                *acc += value;
            }
        }
        let len = rows.len() as f64;
        for acc in mean.iter_mut() {
            *acc /= len;
        }

        out.extend(self.window.tail(chunk.len()).iter().map(|row| row.with_values(mean)));
    }
}

/// 指数平滑：`y[0] = x[0]`, `y[i] = α·x[i] + (1-α)·y[i-1]`
///
/// 每个批次都在整个（原始值）窗口上重新计算。
/// 递推以第一行为初值（而不是 0），因此 `α = 1` 时每一行都原样输出。
#[derive(Debug, Clone)]
pub struct Exponential {
    window: FilterWindow,
    alpha: f64,
}

impl Exponential {
    fn process(&mut self, chunk: &[MeasurementRecord], out: &mut RecordBatch) {
        self.window.push(chunk);
        let rows = self.window.rows();
        let skip = rows.len() - chunk.len();

        let mut smoothed = rows[0].values();
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                let x = row.values();
                for (y, x) in smoothed.iter_mut().zip(x) {
                    *y = self.alpha * x + (1.0 - self.alpha) * *y;
                }
            }
            if i >= skip {
                out.push(row.with_values(smoothed));
            }
        }
    }
}

/// Savitzky-Golay 平滑（镜像边界），输出整个窗口
#[derive(Debug, Clone)]
pub struct SavitzkyGolay {
    window: FilterWindow,
    order: usize,
    coefficients: Vec<f64>,
}

impl SavitzkyGolay {
    fn process(&mut self, chunk: &[MeasurementRecord]) {
        self.window.push(chunk);
    }

    fn smoothed_window(&self) -> RecordBatch {
        let rows = self.window.rows();
        let len = rows.len();
        let half = (self.coefficients.len() / 2) as isize;

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                let mut values = [0.0f64; 6];
                for (k, c) in self.coefficients.iter().enumerate() {
                    let source = rows[mirror_index(i as isize + k as isize - half, len)].values();
                    for (acc, x) in values.iter_mut().zip(source) {
                        *acc += c * x;
                    }
                }
                row.with_values(values)
            })
            .collect()
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

/// 滤波器（封闭集合，构造时由 [`FilterKind`] 决定）
#[derive(Debug, Clone)]
pub enum Filter {
    MovingAverage(MovingAverage),
    Exponential(Exponential),
    SavitzkyGolay(SavitzkyGolay),
}

impl Filter {
    pub fn new(kind: FilterKind) -> Result<Self, FilterError> {
        kind.validate()?;
        let filter = match kind {
            FilterKind::MovingAverage { window } => Self::MovingAverage(MovingAverage {
                window: FilterWindow::new(window),
            }),
            FilterKind::Exponential { window, alpha } => Self::Exponential(Exponential {
                window: FilterWindow::new(window),
                alpha,
            }),
            FilterKind::SavitzkyGolay { window, order } => Self::SavitzkyGolay(SavitzkyGolay {
                window: FilterWindow::new(window),
                order,
                coefficients: savgol_coefficients(window, order)?,
            }),
        };
        Ok(filter)
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Self::MovingAverage(f) => FilterKind::MovingAverage {
                window: f.window.capacity(),
            },
            Self::Exponential(f) => FilterKind::Exponential {
                window: f.window.capacity(),
                alpha: f.alpha,
            },
            Self::SavitzkyGolay(f) => FilterKind::SavitzkyGolay {
                window: f.window.capacity(),
                order: f.order,
            },
        }
    }

    fn window(&self) -> &FilterWindow {
        match self {
            Self::MovingAverage(f) => &f.window,
            Self::Exponential(f) => &f.window,
            Self::SavitzkyGolay(f) => &f.window,
        }
    }

    pub fn window_len(&self) -> usize {
        self.window().capacity()
    }

    /// 滤波一个批次
    ///
    /// 空批次返回空批次，窗口不变。
    pub fn filter(&mut self, batch: RecordBatch) -> RecordBatch {
        if batch.is_empty() {
            return batch;
        }
        let capacity = self.window_len();

        match self {
            Self::MovingAverage(f) => {
                let mut out = RecordBatch::with_capacity(batch.len());
                for chunk in batch.chunks(capacity) {
                    f.process(chunk, &mut out);
                }
                out
            },
            Self::Exponential(f) => {
                let mut out = RecordBatch::with_capacity(batch.len());
                for chunk in batch.chunks(capacity) {
                    f.process(chunk, &mut out);
                }
                out
            },
            Self::SavitzkyGolay(f) => {
                // 每个分块输出一次整个窗口，保证每条记录至少转发一次
                let chunks = batch.len().div_ceil(capacity);
                let mut out = RecordBatch::with_capacity(chunks * capacity);
                for chunk in batch.chunks(capacity) {
                    f.process(chunk);
                    out.extend(f.smoothed_window());
                }
                out
            },
        }
    }

    /// 丢弃窗口内容，下一个批次重新初始化
    pub fn reset(&mut self) {
        match self {
            Self::MovingAverage(f) => f.window.clear(),
            Self::Exponential(f) => f.window.clear(),
            Self::SavitzkyGolay(f) => f.window.clear(),
        }
    }
}
