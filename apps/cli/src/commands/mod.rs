//! 命令定义和实现

pub mod bias;
pub mod config;
pub mod record;

pub use bias::BiasCommand;
pub use config::ConfigCommand;
pub use record::RecordCommand;
