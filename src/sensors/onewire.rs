//! DS18B20 readings from the Linux one-wire sysfs interface.
//!
//! The kernel exposes each sensor as `<root>/<device-id>/w1_slave`:
//!
//! ```text
//! 50 05 4b 46 7f ff 0c 10 1c : crc=1c YES
//! 50 05 4b 46 7f ff 0c 10 1c t=21500
//! ```
//!
//! The first line carries the CRC verdict, the second the temperature in
//! milli-Celsius.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::OneWireSensorConfig;

pub const DS18B20: &str = "DS18B20";

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Failed to read one-wire device: {0}")]
    ReadFailure(#[from] io::Error),

    #[error("CRC check failed")]
    InvalidCrc,

    #[error("Malformed bus payload: {0}")]
    InvalidFormat(String),

    #[error("Temperature value is not an integer: {0}")]
    ParseFailure(String),
}

/// Raw access to one-wire device files
#[async_trait]
pub trait OneWireBus: Send + Sync {
    async fn read_device(&self, device_id: &str) -> io::Result<String>;
}

/// Reads `w1_slave` files below the sysfs device root
#[derive(Debug, Clone)]
pub struct SysfsOneWireBus {
    root: PathBuf,
}

impl SysfsOneWireBus {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl OneWireBus for SysfsOneWireBus {
    async fn read_device(&self, device_id: &str) -> io::Result<String> {
        let mut path = self.root.clone();
        path.push(device_id);
        path.push("w1_slave");
        tokio::fs::read_to_string(&path).await
    }
}

/// Parses a `w1_slave` payload into degrees Celsius
pub fn parse_w1_slave(payload: &str) -> Result<f64, SensorError> {
    let mut lines = payload.split('\n');
    let (status, data) = match (lines.next(), lines.next()) {
        (Some(status), Some(data)) => (status, data),
        _ => {
            return Err(SensorError::InvalidFormat(
                "expected two lines".to_string(),
            ))
        }
    };

    if !status.trim_end_matches(['\r', '\n']).ends_with("YES") {
        return Err(SensorError::InvalidCrc);
    }

    let equals = data.matches('=').count();
    if equals != 1 {
        return Err(SensorError::InvalidFormat(format!(
            "expected exactly one '=' in data line, found {equals}"
        )));
    }

    // exactly one '=' was counted above
    let raw = data.split_once('=').map(|(_, v)| v.trim()).unwrap_or_default();
    let milli: i64 = raw
        .parse()
        .map_err(|_| SensorError::ParseFailure(raw.to_string()))?;

    Ok(milli as f64 / 1000.0)
}

/// Reads configured DS18B20 sensors through a [`OneWireBus`]
#[derive(Clone)]
pub struct TemperatureReader {
    bus: Arc<dyn OneWireBus>,
    sensors: Vec<OneWireSensorConfig>,
}

impl TemperatureReader {
    pub fn new(bus: Arc<dyn OneWireBus>, sensors: Vec<OneWireSensorConfig>) -> Self {
        Self { bus, sensors }
    }

    pub fn sensors(&self) -> &[OneWireSensorConfig] {
        &self.sensors
    }

    pub fn sensor_by_name(&self, name: &str) -> Option<&OneWireSensorConfig> {
        self.sensors.iter().find(|s| s.name == name)
    }

    /// Reads one device by its bus id
    pub async fn read_celsius(&self, device_id: &str) -> Result<f64, SensorError> {
        let payload = self.bus.read_device(device_id).await.map_err(|e| {
            warn!("onewire: failed to read {}: {}", device_id, e);
            SensorError::ReadFailure(e)
        })?;

        match parse_w1_slave(&payload) {
            Ok(celsius) => {
                debug!("onewire: {} = {:.3} C", device_id, celsius);
                Ok(celsius)
            }
            Err(e) => {
                warn!("onewire: invalid payload from {}: {}", device_id, e);
                Err(e)
            }
        }
    }

    /// Reads every configured sensor in config order
    pub async fn read_all(&self) -> Vec<(&OneWireSensorConfig, Result<f64, SensorError>)> {
        let mut results = Vec::with_capacity(self.sensors.len());
        for sensor in &self.sensors {
            let result = self.read_celsius(&sensor.id).await;
            results.push((sensor, result));
        }
        results
    }
}
