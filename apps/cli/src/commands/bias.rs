//! 偏置命令
//!
//! 对一段静置录制（`record --no-unbias` 得到的 CSV）求平均，作为新的偏置向量。

use super::config::load_config;
use anyhow::{Context, Result};
use axia_tools::BiasVector;
use clap::Args;
use std::path::PathBuf;

/// 偏置命令参数
#[derive(Args, Debug)]
pub struct BiasCommand {
    /// 传感器配置文件（TOML）
    #[arg(short, long)]
    pub config: PathBuf,

    /// 静置录制（CSV，第一列为序号）
    #[arg(long)]
    pub from_csv: PathBuf,

    /// 把结果写回配置文件
    #[arg(short, long)]
    pub write: bool,
}

impl BiasCommand {
    pub fn execute(&self) -> Result<()> {
        let mut config = load_config(&self.config)?;

        let bias = BiasVector::average_from_csv(&self.from_csv)
            .with_context(|| format!("计算偏置失败: {}", self.from_csv.display()))?;

        println!("偏置向量 [Fx, Fy, Fz, Tx, Ty, Tz]:");
        println!("  {:?}", bias.values());

        if self.write {
            config.set_bias(bias);
            config
                .save_to_file(&self.config)
                .with_context(|| format!("写入配置失败: {}", self.config.display()))?;
            println!("✅ 已写入: {}", self.config.display());
        }

        Ok(())
    }
}
