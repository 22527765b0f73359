//! # 记录发布
//!
//! 把条件化后的记录逐条推送给外部发布系统。
//!
//! - [`PublishSink`]: 包装一个推送回调（按到达顺序逐条调用）
//! - [`ChannelPublisher`]: 通过有界通道转发，队列满时丢弃记录并计数，
//!   不阻塞采集线程

use crate::recording::{Sink, SinkError};
use axia_protocol::{MeasurementRecord, RecordBatch};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// 默认发布队列容量（约 10 秒 @ 1kHz）
pub const DEFAULT_PUBLISH_CAPACITY: usize = 10_000;

/// 逐条推送接口
pub trait Publisher: Send {
    fn publish(&mut self, record: &MeasurementRecord) -> Result<(), SinkError>;
}

impl<F> Publisher for F
where
    F: FnMut(&MeasurementRecord) -> Result<(), SinkError> + Send,
{
    fn publish(&mut self, record: &MeasurementRecord) -> Result<(), SinkError> {
        self(record)
    }
}

/// 把发布者适配为 [`Sink`]
pub struct PublishSink<P> {
    name: String,
    publisher: Option<P>,
}

impl<P: Publisher> PublishSink<P> {
    pub fn new(name: impl Into<String>, publisher: P) -> Self {
        Self {
            name: name.into(),
            publisher: Some(publisher),
        }
    }
}

impl<P: Publisher> Sink for PublishSink<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn append(&mut self, batch: &RecordBatch) -> Result<(), SinkError> {
        let publisher = self
            .publisher
            .as_mut()
            .ok_or_else(|| SinkError::Closed(self.name.clone()))?;
        for record in batch {
            publisher.publish(record)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        // 丢弃发布者（通道发送端随之关闭，接收端会看到 Disconnected）
        self.publisher = None;
        Ok(())
    }
}

/// 有界通道发布者
pub struct ChannelPublisher {
    tx: Sender<MeasurementRecord>,
    published: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, Receiver<MeasurementRecord>) {
        Self::with_capacity(DEFAULT_PUBLISH_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, Receiver<MeasurementRecord>) {
        let (tx, rx) = bounded(capacity);
        (
            Self {
                tx,
                published: Arc::new(AtomicU64::new(0)),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// 成功入队的记录计数器
    pub fn published(&self) -> &Arc<AtomicU64> {
        &self.published
    }

    /// 因队列满而丢弃的记录计数器
    pub fn dropped(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&mut self, record: &MeasurementRecord) -> Result<(), SinkError> {
        match self.tx.try_send(*record) {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 1000 == 0 {
                    warn!("Publish queue full, {} record(s) dropped so far", dropped);
                }
                Ok(())
            },
            Err(TrySendError::Disconnected(_)) => {
                Err(SinkError::Publish("subscriber disconnected".to_string()))
            },
        }
    }
}
