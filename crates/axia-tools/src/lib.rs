//! # Axia Tools - 信号处理与输出
//!
//! **依赖原则**: 只依赖 `axia-protocol`，不依赖 `axia-driver`（没有 IO 线程）
//!
//! ## 包含模块
//!
//! - `config` - 传感器配置（TOML）
//! - `filter` - 流式滤波器（滑动平均 / 指数 / Savitzky-Golay）
//! - `savgol` - Savitzky-Golay 系数
//! - `unbias` - 偏置向量与去偏置
//! - `recording` - 文件输出（CSV / 长度前缀二进制）
//! - `publish` - 逐条发布

pub mod config;
pub mod filter;
pub mod publish;
pub mod recording;
pub mod savgol;
pub mod unbias;

// 重新导出常用类型
pub use config::{ConfigError, DEFAULT_RDT_PORT, SensorConfig};
pub use filter::{Filter, FilterError, FilterKind, FilterWindow};
pub use publish::{ChannelPublisher, PublishSink, Publisher};
pub use recording::{BinarySink, CsvSink, Sink, SinkError, open_file_sink, read_binary_records};
pub use unbias::{BiasError, BiasHandle, BiasVector, Unbiaser};
