//! 录制器（对外 API）
//!
//! 构造时建立传输并启动采集线程；`start_recording` 发送启动命令并打开录制开关，
//! `stop_recording` 发送停止命令、关闭开关并结束采集线程。
//! 再次 `start_recording` 时重新启动采集线程。

use crate::error::RecorderError;
use crate::pipeline::ConditioningPipeline;
use crate::stats::{PipelineCounters, RecorderStats};
use axia_driver::{
    BatchHandler, CaptureConfig, CaptureLoop, Diagnostics, SequenceMonitor, SplittableTransport,
    TracingDiagnostics, TransportError,
};
use axia_protocol::RecordBatch;
use axia_tools::{BiasHandle, BiasVector, Filter, FilterKind, SensorConfig, Sink, Unbiaser};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// 采集线程上的批次处理器
struct RecorderHandler {
    pipeline: Arc<Mutex<ConditioningPipeline>>,
    recording: Arc<AtomicBool>,
    counters: Arc<PipelineCounters>,
}

impl BatchHandler for RecorderHandler {
    fn on_batch(&mut self, batch: RecordBatch) {
        // 每个批次只读取一次录制开关
        if !self.recording.load(Ordering::Acquire) {
            self.counters.batches_skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.pipeline.lock().process(batch);
    }

    fn on_fault(&mut self, error: &TransportError) {
        error!("Capture stopped by transport error: {}", error);
        self.recording.store(false, Ordering::Release);
    }
}

/// 录制器构建器
pub struct RecorderBuilder {
    config: SensorConfig,
    capture_config: Option<CaptureConfig>,
    filter: Option<FilterKind>,
    unbias: bool,
    sinks: Vec<Box<dyn Sink>>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl RecorderBuilder {
    /// 滤波器默认取配置文件中的 `filter`
    pub fn new(config: SensorConfig) -> Self {
        let filter = config.filter;
        Self {
            config,
            capture_config: None,
            filter,
            unbias: true,
            sinks: Vec::new(),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    pub fn filter(mut self, filter: Option<FilterKind>) -> Self {
        self.filter = filter;
        self
    }

    /// 是否使用配置中的偏置向量（否则从零偏置开始）
    pub fn unbias(mut self, enabled: bool) -> Self {
        self.unbias = enabled;
        self
    }

    pub fn sink<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn boxed_sink(mut self, sink: Box<dyn Sink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// 覆盖默认采集配置（默认 `records_per_packet` 取自传感器配置）
    pub fn capture_config(mut self, capture_config: CaptureConfig) -> Self {
        self.capture_config = Some(capture_config);
        self
    }

    /// 连接到配置中的 UDP 端点
    pub fn build(self) -> Result<Recorder, RecorderError> {
        let endpoint = self.config.endpoint();
        self.build_inner(|capture| capture.connect(endpoint))
    }

    /// 使用指定传输（测试或自定义链路）
    pub fn build_with_transport<T>(self, transport: T) -> Result<Recorder, RecorderError>
    where
        T: SplittableTransport,
        T::Rx: Send + 'static,
        T::Tx: Send + 'static,
    {
        self.build_inner(move |capture| capture.attach(transport))
    }

    fn build_inner<F>(self, connect: F) -> Result<Recorder, RecorderError>
    where
        F: FnOnce(&mut CaptureLoop) -> Result<(), axia_driver::DriverError>,
    {
        self.config.validate()?;
        if self.sinks.is_empty() {
            return Err(RecorderError::NoSinks);
        }

        let codec = self.config.codec()?;
        let capture_config = self.capture_config.unwrap_or_else(|| CaptureConfig {
            records_per_packet: self.config.records_per_packet,
            ..Default::default()
        });

        let filter = self.filter.map(Filter::new).transpose()?;
        let bias = if self.unbias {
            self.config.bias()
        } else {
            BiasVector::ZERO
        };
        let unbiaser = Unbiaser::new(bias);
        let bias_handle = unbiaser.handle();

        let pipeline = ConditioningPipeline::new(
            unbiaser,
            SequenceMonitor::with_diagnostics(self.diagnostics.clone()),
            filter,
            self.sinks,
        );
        let counters = pipeline.counters();

        let mut capture =
            CaptureLoop::with_diagnostics(codec, capture_config, self.diagnostics.clone());
        connect(&mut capture)?;

        let mut recorder = Recorder {
            capture,
            pipeline: Arc::new(Mutex::new(pipeline)),
            counters,
            bias: bias_handle,
            recording: Arc::new(AtomicBool::new(false)),
            streamed: false,
            closed: false,
        };
        recorder.listen()?;

        info!(
            "Recorder ready: sensor {}, filter {}, bias {:?}",
            self.config.endpoint(),
            self.filter.map_or("none", |kind| kind.name()),
            bias.values()
        );
        Ok(recorder)
    }
}

/// 录制器
pub struct Recorder {
    capture: CaptureLoop,
    /// 采集线程处理批次时加锁；控制线程只在采集线程结束后加锁
    pipeline: Arc<Mutex<ConditioningPipeline>>,
    counters: Arc<PipelineCounters>,
    bias: BiasHandle,
    recording: Arc<AtomicBool>,
    /// 采集线程是否已经处理过一次录制（重新启动时需要重置流状态）
    streamed: bool,
    closed: bool,
}

impl Recorder {
    pub fn builder(config: SensorConfig) -> RecorderBuilder {
        RecorderBuilder::new(config)
    }

    fn listen(&mut self) -> Result<(), RecorderError> {
        if self.capture.is_listening() {
            return Ok(());
        }
        // 回收上一次采集线程（若因故障退出）
        if let Err(e) = self.capture.stop_listening() {
            warn!("Previous capture thread ended with error: {}", e);
        }
        if self.streamed {
            self.pipeline.lock().reset_stream();
        }
        self.capture.run(RecorderHandler {
            pipeline: self.pipeline.clone(),
            recording: self.recording.clone(),
            counters: self.counters.clone(),
        })?;
        Ok(())
    }

    /// 开始连续录制
    pub fn start_recording(&mut self) -> Result<(), RecorderError> {
        self.ensure_open()?;
        self.listen()?;
        self.capture.start_continuous()?;
        self.begin();
        Ok(())
    }

    /// 请求传感器发送 `count` 条记录并录制
    pub fn start_recording_n(&mut self, count: u32) -> Result<(), RecorderError> {
        self.ensure_open()?;
        self.listen()?;
        self.capture.start_n(count)?;
        self.begin();
        Ok(())
    }

    fn begin(&mut self) {
        self.recording.store(true, Ordering::Release);
        self.streamed = true;
        info!("Recording started");
    }

    /// 停止录制并结束采集线程
    ///
    /// 返回采集线程的退出原因（若因传输错误退出）。
    /// 返回 `IoThread`（join 超时）时接收端已丢失，之后无法再次录制，需要重新构建录制器。
    pub fn stop_recording(&mut self) -> Result<(), RecorderError> {
        self.ensure_open()?;
        let sent = self.capture.stop();
        self.recording.store(false, Ordering::Release);
        let joined = self.capture.stop_listening();
        info!("Recording stopped");
        sent?;
        joined?;
        Ok(())
    }

    /// 替换偏置向量（下一个批次生效，可在录制中调用）
    pub fn set_bias(&self, bias: BiasVector) {
        self.bias.set_bias(bias);
        debug!("Bias replaced: {:?}", bias.values());
    }

    pub fn bias(&self) -> BiasVector {
        self.bias.bias()
    }

    pub fn bias_handle(&self) -> BiasHandle {
        self.bias.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    pub fn is_listening(&self) -> bool {
        self.capture.is_listening()
    }

    pub fn stats(&self) -> RecorderStats {
        self.counters.snapshot(self.capture.metrics())
    }

    /// 停止采集并关闭所有输出（可重复调用）
    ///
    /// 返回第一个失败的输出错误。
    pub fn close(&mut self) -> Result<(), RecorderError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if self.recording.swap(false, Ordering::AcqRel) {
            if let Err(e) = self.capture.stop() {
                warn!("Failed to send stop command on close: {}", e);
            }
        }
        if let Err(e) = self.capture.disconnect() {
            warn!("Capture thread ended with error: {}", e);
        }

        let failures = self.pipeline.lock().close_sinks();
        info!("Recorder closed");
        match failures.into_iter().next() {
            Some((name, source)) => Err(RecorderError::Sink { name, source }),
            None => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<(), RecorderError> {
        if self.closed {
            Err(RecorderError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close recorder on drop: {}", e);
        }
    }
}
