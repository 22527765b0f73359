//! 录制命令
//!
//! 连接传感器，录制 RDT 数据流到 CSV 或二进制文件。Ctrl-C 停止。

use super::config::load_config;
use anyhow::{Context, Result};
use axia_recorder::{RecorderBuilder, RecorderStats};
use axia_tools::{FilterKind, open_file_sink};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 状态轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 有限采样模式下，最后一个记录之后等待的时间
const SAMPLES_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FilterArg {
    MovingAverage,
    Exponential,
    SavitzkyGolay,
}

/// 录制命令参数
#[derive(Args, Debug)]
pub struct RecordCommand {
    /// 传感器配置文件（TOML）
    #[arg(short, long)]
    pub config: PathBuf,

    /// 输出文件（`.csv` 为文本，其它为二进制）
    #[arg(short, long)]
    pub output: PathBuf,

    /// 滤波器（覆盖配置）
    #[arg(short, long, value_enum)]
    pub filter: Option<FilterArg>,

    /// 滤波窗口长度
    #[arg(short, long, requires = "filter")]
    pub window: Option<usize>,

    /// 指数平滑系数
    #[arg(long, requires = "filter")]
    pub alpha: Option<f64>,

    /// Savitzky-Golay 多项式阶数
    #[arg(long, requires = "filter")]
    pub order: Option<usize>,

    /// 录制时长（秒），省略表示直到 Ctrl-C
    #[arg(short, long, conflicts_with = "samples")]
    pub duration: Option<u64>,

    /// 请求传感器发送固定数量的记录
    #[arg(short, long)]
    pub samples: Option<u32>,

    /// 不应用配置中的偏置向量
    #[arg(long)]
    pub no_unbias: bool,
}

impl RecordCommand {
    /// 根据参数得到滤波器；未指定 `--filter` 时使用配置文件中的设置
    pub fn filter_kind(&self, configured: Option<FilterKind>) -> Option<FilterKind> {
        let Some(filter) = self.filter else {
            return configured;
        };

        let mut kind = match filter {
            FilterArg::MovingAverage => FilterKind::DEFAULT_MOVING_AVERAGE,
            FilterArg::Exponential => FilterKind::DEFAULT_EXPONENTIAL,
            FilterArg::SavitzkyGolay => FilterKind::DEFAULT_SAVITZKY_GOLAY,
        };
        match &mut kind {
            FilterKind::MovingAverage { window } => {
                *window = self.window.unwrap_or(*window);
            },
            FilterKind::Exponential { window, alpha } => {
                *window = self.window.unwrap_or(*window);
                *alpha = self.alpha.unwrap_or(*alpha);
            },
            FilterKind::SavitzkyGolay { window, order } => {
                *window = self.window.unwrap_or(*window);
                *order = self.order.unwrap_or(*order);
            },
        }
        Some(kind)
    }

    /// 执行录制
    pub fn execute(&self) -> Result<()> {
        let config = load_config(&self.config)?;
        let filter = self.filter_kind(config.filter);
        if let Some(kind) = filter {
            kind.validate().context("滤波参数无效")?;
        }

        let sink = open_file_sink(&self.output)
            .with_context(|| format!("打开输出文件失败: {}", self.output.display()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        ctrlc::set_handler(move || {
            stop_flag.store(true, Ordering::SeqCst);
        })
        .context("安装 Ctrl-C 处理器失败")?;

        println!("⏳ 连接到传感器 {}...", config.endpoint());
        let mut recorder = RecorderBuilder::new(config)
            .filter(filter)
            .unbias(!self.no_unbias)
            .boxed_sink(sink)
            .build()
            .context("创建录制器失败")?;

        match self.samples {
            Some(count) => recorder.start_recording_n(count)?,
            None => recorder.start_recording()?,
        }
        println!("✅ 开始录制: {}（Ctrl-C 停止）", self.output.display());

        let start = Instant::now();
        let deadline = self.duration.map(Duration::from_secs);
        let mut last_progress = Instant::now();
        let mut last_records = 0;

        loop {
            std::thread::sleep(POLL_INTERVAL);

            if stop.load(Ordering::SeqCst) {
                println!("\n⚠️  收到 Ctrl-C");
                break;
            }
            if deadline.is_some_and(|d| start.elapsed() >= d) {
                println!("\n⏱️  达到时长限制");
                break;
            }
            if !recorder.is_recording() {
                warn!("Capture ended unexpectedly");
                break;
            }

            let stats = recorder.stats();
            if let Some(count) = self.samples {
                if stats.records_in + stats.records_lost >= u64::from(count) {
                    println!("\n✅ 达到采样数");
                    break;
                }
                // 传感器可能少发，一段时间没有新数据即结束
                if stats.records_in == last_records && last_progress.elapsed() >= SAMPLES_GRACE {
                    println!("\n⚠️  传感器停止发送");
                    break;
                }
            }
            if stats.records_in != last_records {
                last_records = stats.records_in;
                last_progress = Instant::now();
            }

            print_progress(&stats, start.elapsed());
        }

        let stopped = recorder.stop_recording();
        let stats = recorder.stats();
        let closed = recorder.close();

        println!();
        print_summary(&stats, start.elapsed());
        info!("Recording finished: {:?}", stats);

        stopped.context("停止录制失败")?;
        closed.context("关闭输出失败")?;
        Ok(())
    }
}

fn print_progress(stats: &RecorderStats, elapsed: Duration) {
    use std::io::Write;
    print!(
        "\r录制中: {} 条记录, 丢失 {} (时长: {:.1}s)",
        stats.records_in,
        stats.records_lost,
        elapsed.as_secs_f64()
    );
    std::io::stdout().flush().ok();
}

fn print_summary(stats: &RecorderStats, elapsed: Duration) {
    println!("录制完成 ({:.1}s):", elapsed.as_secs_f64());
    println!("  数据报: {}", stats.capture.datagrams);
    println!("  记录: {} 输入, {} 输出", stats.records_in, stats.records_out);
    println!("  丢失: {}", stats.records_lost);
    if stats.capture.runt_datagrams > 0 {
        println!("  短包: {}", stats.capture.runt_datagrams);
    }
    for sink in &stats.sinks {
        println!(
            "  输出 {}: {} 批次, {} 次失败",
            sink.name, sink.batches_written, sink.failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(filter: Option<FilterArg>) -> RecordCommand {
        RecordCommand {
            config: PathBuf::from("sensor.toml"),
            output: PathBuf::from("out.csv"),
            filter,
            window: None,
            alpha: None,
            order: None,
            duration: Some(10),
            samples: None,
            no_unbias: false,
        }
    }

    #[test]
    fn test_filter_defaults() {
        let cmd = command(Some(FilterArg::Exponential));
        assert_eq!(cmd.filter_kind(None), Some(FilterKind::DEFAULT_EXPONENTIAL));
    }

    #[test]
    fn test_filter_overrides() {
        let mut cmd = command(Some(FilterArg::SavitzkyGolay));
        cmd.window = Some(7);
        cmd.order = Some(2);
        assert_eq!(
            cmd.filter_kind(Some(FilterKind::DEFAULT_MOVING_AVERAGE)),
            Some(FilterKind::SavitzkyGolay {
                window: 7,
                order: 2
            })
        );
    }

    #[test]
    fn test_configured_filter_used_without_flag() {
        let cmd = command(None);
        assert_eq!(
            cmd.filter_kind(Some(FilterKind::DEFAULT_MOVING_AVERAGE)),
            Some(FilterKind::DEFAULT_MOVING_AVERAGE)
        );
        assert_eq!(cmd.filter_kind(None), None);
    }
}
