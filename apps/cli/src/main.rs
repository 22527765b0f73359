//! # Axia CLI
//!
//! Command-line recorder for Axia force/torque sensors.
//!
//! ```bash
//! # 检查配置
//! axia-cli config check --config sensor.toml
//!
//! # 录制 10 秒，滑动平均滤波
//! axia-cli record --config sensor.toml --output session.csv --filter moving-average --duration 10
//!
//! # 从静置录制计算偏置并写回配置
//! axia-cli bias --config sensor.toml --from-csv tare.csv --write
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{BiasCommand, ConfigCommand, RecordCommand};

const DEFAULT_LOG_FILTER: &str = "axia_cli=info,axia_recorder=info,axia_driver=info";

/// Axia CLI - 力/力矩传感器录制工具
#[derive(Parser, Debug)]
#[command(name = "axia-cli")]
#[command(about = "Command-line recorder for Axia force/torque sensors", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 录制 RDT 数据流到文件
    Record {
        #[command(flatten)]
        args: RecordCommand,
    },

    /// 从静置录制计算偏置向量
    Bias {
        #[command(flatten)]
        args: BiasCommand,
    },

    /// 传感器配置检查
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // RUST_LOG 优先，否则使用默认过滤
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Record { args } => args.execute(),
        Commands::Bias { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record() {
        let cli = Cli::try_parse_from([
            "axia-cli",
            "record",
            "--config",
            "sensor.toml",
            "--output",
            "out.csv",
            "--filter",
            "savitzky-golay",
            "--window",
            "7",
            "--order",
            "2",
            "--samples",
            "100",
        ])
        .unwrap();

        let Commands::Record { args } = cli.command else {
            panic!("expected record command");
        };
        assert_eq!(args.samples, Some(100));
        assert_eq!(args.window, Some(7));
        assert!(!args.no_unbias);
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["axia-cli", "config", "show", "--config", "sensor.toml"])
            .unwrap();
        assert!(matches!(cli.command, Commands::Config(ConfigCommand::Show { .. })));
    }

    #[test]
    fn test_samples_conflicts_with_duration() {
        let result = Cli::try_parse_from([
            "axia-cli",
            "record",
            "--config",
            "sensor.toml",
            "--output",
            "out.bin",
            "--duration",
            "5",
            "--samples",
            "10",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_log_filter_parses() {
        let _ = EnvFilter::new(DEFAULT_LOG_FILTER);
    }
}
