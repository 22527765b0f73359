//! # 录制输出（Sink）
//!
//! 两种只追加的文件格式：
//!
//! ```text
//! CSV（无表头，可被 BiasVector::average_from_csv 读取）:
//! ft_sequence,Fx,Fy,Fz,Tx,Ty,Tz
//!
//! 二进制（每条记录）:
//! [length: u32 LE][bincode MeasurementRecord]
//! ```
//!
//! 文件在创建 Sink 时打开，一直持有到 `close()`。

use axia_protocol::{MeasurementRecord, RecordBatch};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Sink 错误
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Record encoding error: {0}")]
    Encode(#[from] bincode::Error),

    #[error("Sink `{0}` is closed")]
    Closed(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Corrupt recording: {0}")]
    Corrupt(String),
}

/// 记录输出
///
/// `append` 在采集线程内同步调用；`close` 可重复调用。
pub trait Sink: Send {
    fn name(&self) -> &str;

    fn append(&mut self, batch: &RecordBatch) -> Result<(), SinkError>;

    fn close(&mut self) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn append(&mut self, batch: &RecordBatch) -> Result<(), SinkError> {
        (**self).append(batch)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        (**self).close()
    }
}

fn open_append(path: &Path) -> Result<File, SinkError> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// CSV 输出
pub struct CsvSink {
    name: String,
    writer: Option<csv::Writer<File>>,
}

impl CsvSink {
    /// 打开（或创建）文件，追加写入
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(open_append(path)?);
        debug!("CSV sink opened: {}", path.display());
        Ok(Self {
            name: format!("csv:{}", path.display()),
            writer: Some(writer),
        })
    }
}

impl Sink for CsvSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn append(&mut self, batch: &RecordBatch) -> Result<(), SinkError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::Closed(self.name.clone()))?;

        for record in batch {
            let [fx, fy, fz, tx, ty, tz] = record.values();
            writer.write_record([
                record.ft_sequence.to_string(),
                fx.to_string(),
                fy.to_string(),
                fz.to_string(),
                tx.to_string(),
                ty.to_string(),
                tz.to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!("Sink {} closed", self.name);
        }
        Ok(())
    }
}

/// 长度前缀二进制输出
pub struct BinarySink {
    name: String,
    writer: Option<BufWriter<File>>,
}

impl BinarySink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let writer = BufWriter::new(open_append(path)?);
        debug!("Binary sink opened: {}", path.display());
        Ok(Self {
            name: format!("bin:{}", path.display()),
            writer: Some(writer),
        })
    }
}

impl Sink for BinarySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn append(&mut self, batch: &RecordBatch) -> Result<(), SinkError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::Closed(self.name.clone()))?;

        for record in batch {
            let data = bincode::serialize(record)?;
            let len = u32::try_from(data.len())
                .map_err(|_| SinkError::Corrupt(format!("record of {} bytes", data.len())))?;
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&data)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!("Sink {} closed", self.name);
        }
        Ok(())
    }
}

/// 读取 [`BinarySink`] 写出的文件
pub fn read_binary_records<P: AsRef<Path>>(path: P) -> Result<Vec<MeasurementRecord>, SinkError> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    let mut records = Vec::new();

    loop {
        let mut len = [0u8; 4];
        match reader.read_exact(&mut len) {
            Ok(()) => {},
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len) as usize;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => {
                SinkError::Corrupt(format!("truncated record after {} records", records.len()))
            },
            _ => SinkError::Io(e),
        })?;
        records.push(bincode::deserialize(&data)?);
    }

    Ok(records)
}

/// 按文件扩展名选择格式：`.csv` 为 CSV，其余为二进制
pub fn open_file_sink<P: AsRef<Path>>(path: P) -> Result<Box<dyn Sink>, SinkError> {
    let path = path.as_ref();
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        Ok(Box::new(CsvSink::open(path)?))
    } else {
        Ok(Box::new(BinarySink::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unbias::BiasVector;

    fn batch(start: u32) -> RecordBatch {
        (start..start + 3)
            .map(|i| {
                let x = f64::from(i);
                MeasurementRecord {
                    rdt_sequence: i,
                    ft_sequence: i,
                    status: 7,
                    ..Default::default()
                }
                .with_values([x, x + 0.5, -x, 0.1 * x, 1e-9, 12345.678])
            })
            .collect()
    }

    #[test]
    fn test_csv_sink_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let mut sink = CsvSink::open(&path).unwrap();
        sink.append(&batch(10)).unwrap();
        sink.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "10,10,10.5,-10,1,0.000000001,12345.678");
        assert!(lines[2].starts_with("12,12,12.5,-12,"));
    }

    #[test]
    fn test_csv_sink_appends_and_feeds_bias() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tare.csv");

        let mut sink = CsvSink::open(&path).unwrap();
        sink.append(&batch(0)).unwrap();
        sink.close().unwrap();

        // 重新打开后继续追加
        let mut sink = CsvSink::open(&path).unwrap();
        sink.append(&batch(3)).unwrap();
        sink.close().unwrap();

        let bias = BiasVector::average_from_csv(&path).unwrap();
        // x = 0..6 的均值为 2.5
        assert_eq!(bias.values()[0], 2.5);
        assert_eq!(bias.values()[1], 3.0);
        assert!((bias.values()[5] - 12345.678).abs() < 1e-9);
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_append() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = BinarySink::open(dir.path().join("out.bin")).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(matches!(sink.append(&batch(0)), Err(SinkError::Closed(_))));
    }

    #[test]
    fn test_binary_sink_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut sink = BinarySink::open(&path).unwrap();
        sink.append(&batch(0)).unwrap();
        sink.append(&batch(3)).unwrap();
        sink.close().unwrap();

        let records = read_binary_records(&path).unwrap();
        let expected: Vec<MeasurementRecord> =
            batch(0).into_iter().chain(batch(3)).collect();
        assert_eq!(records, expected);
    }

    #[test]
    fn test_binary_reader_detects_truncation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut sink = BinarySink::open(&path).unwrap();
        sink.append(&batch(0)).unwrap();
        sink.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(read_binary_records(&path), Err(SinkError::Corrupt(_))));
    }

    #[test]
    fn test_open_file_sink_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let csv = open_file_sink(dir.path().join("a.CSV")).unwrap();
        assert!(csv.name().starts_with("csv:"));
        let bin = open_file_sink(dir.path().join("a.rec")).unwrap();
        assert!(bin.name().starts_with("bin:"));
    }
}
