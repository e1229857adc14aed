//! Host health: CPU serial number and SoC temperature.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HostHealthError {
    #[error("Failed to read host file: {0}")]
    Io(#[from] io::Error),

    #[error("No serial number found in cpuinfo")]
    MissingSerial,

    #[error("Malformed cpuinfo serial line: {0}")]
    MalformedSerial(String),

    #[error("CPU temperature is not an integer: {0}")]
    MalformedTemperature(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostReading {
    pub serial: String,
    pub cpu_celsius: f64,
}

#[async_trait]
pub trait HostHealth: Send + Sync {
    async fn serial(&self) -> Result<String, HostHealthError>;

    /// Raw SoC temperature in milli-Celsius
    async fn cpu_millicelsius(&self) -> Result<i64, HostHealthError>;

    async fn reading(&self) -> Result<HostReading, HostHealthError> {
        let serial = self.serial().await?;
        let milli = self.cpu_millicelsius().await?;
        Ok(HostReading {
            serial,
            cpu_celsius: milli as f64 / 1000.0,
        })
    }
}

/// Reads `/proc/cpuinfo` and the first thermal zone
#[derive(Debug, Clone)]
pub struct SysfsHostHealth {
    cpuinfo: PathBuf,
    thermal_zone: PathBuf,
}

impl SysfsHostHealth {
    pub fn new(cpuinfo: impl Into<PathBuf>, thermal_zone: impl Into<PathBuf>) -> Self {
        Self {
            cpuinfo: cpuinfo.into(),
            thermal_zone: thermal_zone.into(),
        }
    }
}

#[async_trait]
impl HostHealth for SysfsHostHealth {
    async fn serial(&self) -> Result<String, HostHealthError> {
        let content = tokio::fs::read_to_string(&self.cpuinfo).await?;
        parse_cpu_serial(&content)
    }

    async fn cpu_millicelsius(&self) -> Result<i64, HostHealthError> {
        let content = tokio::fs::read_to_string(&self.thermal_zone).await?;
        parse_millicelsius(&content)
    }
}

/// Extracts the value of the last `Serial : ...` line
pub fn parse_cpu_serial(cpuinfo: &str) -> Result<String, HostHealthError> {
    let mut serial = None;
    for line in cpuinfo.lines().filter(|l| l.starts_with("Serial")) {
        let (_, value) = line
            .split_once(':')
            .ok_or_else(|| HostHealthError::MalformedSerial(line.to_string()))?;
        serial = Some(value.trim().to_string());
    }
    serial.ok_or(HostHealthError::MissingSerial)
}

pub fn parse_millicelsius(raw: &str) -> Result<i64, HostHealthError> {
    let trimmed = raw.trim();
    trimmed
        .parse()
        .map_err(|_| HostHealthError::MalformedTemperature(trimmed.to_string()))
}
