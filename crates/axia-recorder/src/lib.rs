//! # Axia Recorder
//!
//! 把采集循环、序列号检测、去偏置、滤波和输出组装成一个录制器。
//!
//! ## 使用示例
//!
//! ```no_run
//! use axia_recorder::RecorderBuilder;
//! use axia_tools::{CsvSink, FilterKind, SensorConfig};
//!
//! let config = SensorConfig::load_from_file("sensor.toml")?;
//! let mut recorder = RecorderBuilder::new(config)
//!     .filter(Some(FilterKind::DEFAULT_MOVING_AVERAGE))
//!     .sink(CsvSink::open("session.csv")?)
//!     .build()?;
//!
//! recorder.start_recording()?;
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! recorder.stop_recording()?;
//! println!("{:?}", recorder.stats());
//! recorder.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod pipeline;
pub mod recorder;
pub mod stats;

pub use error::RecorderError;
pub use pipeline::{BatchReport, ConditioningPipeline};
pub use recorder::{Recorder, RecorderBuilder};
pub use stats::{RecorderStats, SinkStats};
