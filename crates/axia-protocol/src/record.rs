//! RDT 测量记录
//!
//! 每条记录固定 36 字节，一个数据报可以包含多条记录，记录之间没有分隔符。
//! 数据报长度不是 36 的整数倍时，尾部不足一条记录的字节会被静默丢弃。

use crate::ProtocolError;
use bytes::{Buf, BufMut};
use std::ops::{Deref, DerefMut};

/// 单条记录长度（字节）
pub const RECORD_SIZE: usize = 36;

/// 单个 UDP 数据报最多能承载的记录数（65499 字节有效载荷）
pub const MAX_RECORDS_PER_PACKET: usize = 1819;

/// 原始测量记录（计数值，未换算）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawRecord {
    pub rdt_sequence: u32,
    pub ft_sequence: u32,
    pub status: u32,
    /// Fx, Fy, Fz, Tx, Ty, Tz（ADC 计数，补码）
    pub counts: [i32; 6],
}

impl RawRecord {
    /// 从字节切片解码一条记录
    ///
    /// 切片长度不足 36 字节时返回 `InvalidLength`，多余的字节被忽略。
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < RECORD_SIZE {
            return Err(ProtocolError::InvalidLength {
                expected: RECORD_SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[..RECORD_SIZE];
        let rdt_sequence = buf.get_u32();
        let ft_sequence = buf.get_u32();
        let status = buf.get_u32();
        let mut counts = [0i32; 6];
        for count in counts.iter_mut() {
            *count = buf.get_i32();
        }

        Ok(Self {
            rdt_sequence,
            ft_sequence,
            status,
            counts,
        })
    }

    /// 编码为 36 字节大端格式
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0u8; RECORD_SIZE];
        let mut cursor = &mut bytes[..];
        cursor.put_u32(self.rdt_sequence);
        cursor.put_u32(self.ft_sequence);
        cursor.put_u32(self.status);
        for count in self.counts {
            cursor.put_i32(count);
        }
        bytes
    }
}

/// 测量记录（物理单位）
///
/// 力的单位和力矩的单位由传感器当前标定决定（例如 N 和 N·m）。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasurementRecord {
    /// RDT 发送计数器（以 2^32 回绕）
    pub rdt_sequence: u32,
    /// ADC 采样计数器，每个物理采样加 1（丢包检测依据）
    pub ft_sequence: u32,
    /// 设备状态位（对本库不透明）
    pub status: u32,
    pub fx: f64,
    pub fy: f64,
    pub fz: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

impl MeasurementRecord {
    /// 六个分量 `[Fx, Fy, Fz, Tx, Ty, Tz]`
    pub fn values(&self) -> [f64; 6] {
        [self.fx, self.fy, self.fz, self.tx, self.ty, self.tz]
    }

    /// 覆盖六个分量，标识字段（序号、状态）不变
    pub fn set_values(&mut self, values: [f64; 6]) {
        let [fx, fy, fz, tx, ty, tz] = values;
        self.fx = fx;
        self.fy = fy;
        self.fz = fz;
        self.tx = tx;
        self.ty = ty;
        self.tz = tz;
    }

    /// 返回替换了六个分量的副本
    pub fn with_values(mut self, values: [f64; 6]) -> Self {
        self.set_values(values);
        self
    }
}

/// 记录批次
///
/// 一次接收（一个数据报）解码得到的记录，按到达顺序（即序号顺序）排列。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordBatch {
    records: Vec<MeasurementRecord>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: MeasurementRecord) {
        self.records.push(record);
    }

    pub fn into_records(self) -> Vec<MeasurementRecord> {
        self.records
    }
}

impl Deref for RecordBatch {
    type Target = [MeasurementRecord];

    fn deref(&self) -> &Self::Target {
        &self.records
    }
}

impl DerefMut for RecordBatch {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.records
    }
}

impl From<Vec<MeasurementRecord>> for RecordBatch {
    fn from(records: Vec<MeasurementRecord>) -> Self {
        Self { records }
    }
}

impl FromIterator<MeasurementRecord> for RecordBatch {
    fn from_iter<I: IntoIterator<Item = MeasurementRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl Extend<MeasurementRecord> for RecordBatch {
    fn extend<I: IntoIterator<Item = MeasurementRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

impl IntoIterator for RecordBatch {
    type Item = MeasurementRecord;
    type IntoIter = std::vec::IntoIter<MeasurementRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordBatch {
    type Item = &'a MeasurementRecord;
    type IntoIter = std::slice::Iter<'a, MeasurementRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// RDT 数据帧编解码器
///
/// 持有计数到物理单位的换算系数（counts-per-force / counts-per-torque）。
/// 系数在构造时校验，解码过程不会出现除零。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RdtCodec {
    counts_per_force: f64,
    counts_per_torque: f64,
}

impl RdtCodec {
    /// 创建编解码器
    ///
    /// # 错误
    /// - `ProtocolError::InvalidScaling`: 系数为 0、NaN 或无穷大
    pub fn new(counts_per_force: f64, counts_per_torque: f64) -> Result<Self, ProtocolError> {
        check_scaling("counts_per_force", counts_per_force)?;
        check_scaling("counts_per_torque", counts_per_torque)?;

        Ok(Self {
            counts_per_force,
            counts_per_torque,
        })
    }

    pub fn counts_per_force(&self) -> f64 {
        self.counts_per_force
    }

    pub fn counts_per_torque(&self) -> f64 {
        self.counts_per_torque
    }

    /// 将原始计数换算为物理单位
    pub fn scale(&self, raw: &RawRecord) -> MeasurementRecord {
        let [fx, fy, fz, tx, ty, tz] = raw.counts;
        MeasurementRecord {
            rdt_sequence: raw.rdt_sequence,
            ft_sequence: raw.ft_sequence,
            status: raw.status,
            fx: f64::from(fx) / self.counts_per_force,
            fy: f64::from(fy) / self.counts_per_force,
            fz: f64::from(fz) / self.counts_per_force,
            tx: f64::from(tx) / self.counts_per_torque,
            ty: f64::from(ty) / self.counts_per_torque,
            tz: f64::from(tz) / self.counts_per_torque,
        }
    }

    /// 将物理单位换算回计数（四舍五入，超出 i32 范围时饱和）
    pub fn unscale(&self, record: &MeasurementRecord) -> RawRecord {
        let force = |v: f64| (v * self.counts_per_force).round() as i32;
        let torque = |v: f64| (v * self.counts_per_torque).round() as i32;
        RawRecord {
            rdt_sequence: record.rdt_sequence,
            ft_sequence: record.ft_sequence,
            status: record.status,
            counts: [
                force(record.fx),
                force(record.fy),
                force(record.fz),
                torque(record.tx),
                torque(record.ty),
                torque(record.tz),
            ],
        }
    }

    /// 解码一个数据报
    ///
    /// 返回 `floor(len / 36)` 条记录；尾部不足 36 字节的部分被丢弃（不是错误）。
    /// 不足 36 字节的数据报得到空批次。
    pub fn decode_packet(&self, bytes: &[u8]) -> RecordBatch {
        bytes
            .chunks_exact(RECORD_SIZE)
            .filter_map(|chunk| RawRecord::decode(chunk).ok())
            .map(|raw| self.scale(&raw))
            .collect()
    }

    /// 将记录编码为数据报（用于测试和传感器模拟）
    pub fn encode_packet<'a, I>(&self, records: I) -> Vec<u8>
    where
        I: IntoIterator<Item = &'a MeasurementRecord>,
    {
        let mut packet = Vec::new();
        for record in records {
            packet.extend_from_slice(&self.unscale(record).encode());
        }
        packet
    }
}

/// 数据报长度对应的尾部丢弃字节数
pub const fn trailing_bytes(packet_len: usize) -> usize {
    packet_len % RECORD_SIZE
}

fn check_scaling(name: &'static str, value: f64) -> Result<(), ProtocolError> {
    if value == 0.0 || !value.is_finite() {
        return Err(ProtocolError::InvalidScaling { name, value });
    }
    Ok(())
}
