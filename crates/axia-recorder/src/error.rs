//! 录制器错误类型

use axia_driver::DriverError;
use axia_tools::{ConfigError, FilterError, SinkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Sink `{name}` failed: {source}")]
    Sink {
        name: String,
        #[source]
        source: SinkError,
    },

    /// 至少需要一个输出
    #[error("Recorder needs at least one sink")]
    NoSinks,

    #[error("Recorder is closed")]
    Closed,
}
