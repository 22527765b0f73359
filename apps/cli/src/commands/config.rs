//! 配置检查命令

use anyhow::{Context, Result};
use axia_tools::SensorConfig;
use clap::Subcommand;
use std::path::{Path, PathBuf};

/// 加载并校验传感器配置
pub fn load_config(path: &Path) -> Result<SensorConfig> {
    SensorConfig::load_from_file(path)
        .with_context(|| format!("加载传感器配置失败: {}", path.display()))
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 校验配置文件
    Check {
        /// 传感器配置文件（TOML）
        #[arg(short, long)]
        config: PathBuf,
    },

    /// 打印规范化后的配置
    Show {
        /// 传感器配置文件（TOML）
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Check { config } => Self::check_(&config),
            ConfigCommand::Show { config } => Self::show_(&config),
        }
    }

    fn check_(path: &Path) -> Result<()> {
        let config = load_config(path)?;

        println!("✅ 配置有效: {}", path.display());
        println!("  传感器: {}", config.endpoint());
        println!(
            "  标定: {} counts/force, {} counts/torque",
            config.counts_per_force, config.counts_per_torque
        );
        println!("  每包记录数: {}", config.records_per_packet);
        if let Some(rate) = config.rdt_rate_hz {
            println!("  RDT 速率: {} Hz", rate);
        }
        if let Some(ref location) = config.location {
            println!("  位置: {}", location);
        }
        println!(
            "  滤波: {}",
            config.filter.map_or("none", |kind| kind.name())
        );
        println!("  偏置: {:?}", config.bias().values());

        Ok(())
    }

    fn show_(path: &Path) -> Result<()> {
        let config = load_config(path)?;
        print!("{}", config.to_toml_string().context("序列化配置失败")?);
        Ok(())
    }
}
