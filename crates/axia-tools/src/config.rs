//! # 传感器配置
//!
//! 采集所需的传感器参数（TOML 文件）。固件配置由设备控制台维护，
//! 这里只保存采集链路用到的只读快照和偏置向量。
//!
//! ```toml
//! udp_ip = "192.168.1.1"
//! udp_port = 49152
//! counts_per_force = 1000000.0
//! counts_per_torque = 1000000.0
//! records_per_packet = 10
//! rdt_rate_hz = 1000
//! location = "bench-2"
//! bias_vector = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
//!
//! [filter]
//! type = "moving-average"
//! window = 5
//! ```

use crate::filter::{FilterError, FilterKind};
use crate::unbias::BiasVector;
use axia_protocol::{MAX_RECORDS_PER_PACKET, ProtocolError, RdtCodec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use thiserror::Error;

/// RDT 协议标准端口
pub const DEFAULT_RDT_PORT: u16 = 49152;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Filter(#[from] FilterError),
}

/// 传感器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// 传感器 IP 地址
    #[serde(default = "default_udp_ip")]
    pub udp_ip: IpAddr,

    /// RDT 端口
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,

    /// 每单位力的计数
    pub counts_per_force: f64,

    /// 每单位力矩的计数
    pub counts_per_torque: f64,

    /// 每个 UDP 数据报的记录数（传感器 `rdtSize`）
    #[serde(default = "default_records_per_packet")]
    pub records_per_packet: usize,

    /// 标称 RDT 输出频率（仅记录，不参与采集）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdt_rate_hz: Option<u32>,

    /// 安装位置（仅记录）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// 偏置向量 [Fx, Fy, Fz, Tx, Ty, Tz]
    #[serde(default)]
    pub bias_vector: [f64; 6],

    /// 默认滤波器
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterKind>,
}

fn default_udp_ip() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))
}

fn default_udp_port() -> u16 {
    DEFAULT_RDT_PORT
}

fn default_records_per_packet() -> usize {
    1
}

impl SensorConfig {
    pub fn new(udp_ip: IpAddr, counts_per_force: f64, counts_per_torque: f64) -> Self {
        Self {
            udp_ip,
            udp_port: DEFAULT_RDT_PORT,
            counts_per_force,
            counts_per_torque,
            records_per_packet: default_records_per_packet(),
            rdt_rate_hz: None,
            location: None,
            bias_vector: [0.0; 6],
            filter: None,
        }
    }

    /// 从文件加载并校验
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        self.validate()?;
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// 校验所有字段
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 换算系数由编解码器统一校验
        RdtCodec::new(self.counts_per_force, self.counts_per_torque)?;

        if self.udp_port == 0 {
            return Err(ConfigError::Invalid {
                field: "udp_port",
                reason: "port must be non-zero".to_string(),
            });
        }

        if self.records_per_packet == 0 || self.records_per_packet > MAX_RECORDS_PER_PACKET {
            return Err(ConfigError::Invalid {
                field: "records_per_packet",
                reason: format!(
                    "{} is outside 1..={}",
                    self.records_per_packet, MAX_RECORDS_PER_PACKET
                ),
            });
        }

        if self.bias_vector.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "bias_vector",
                reason: "all components must be finite".to_string(),
            });
        }

        if let Some(filter) = &self.filter {
            filter.validate()?;
        }

        Ok(())
    }

    /// 传感器 RDT 端点
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.udp_ip, self.udp_port)
    }

    pub fn codec(&self) -> Result<RdtCodec, ConfigError> {
        Ok(RdtCodec::new(self.counts_per_force, self.counts_per_torque)?)
    }

    pub fn bias(&self) -> BiasVector {
        BiasVector::new(self.bias_vector)
    }

    pub fn set_bias(&mut self, bias: BiasVector) {
        self.bias_vector = bias.values();
    }
}
