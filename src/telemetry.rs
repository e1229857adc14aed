//! Periodic telemetry snapshot on `tele/<device>/SENSOR`.
//!
//! ```json
//! {
//!   "Time": "2024-01-05T18:22:04",
//!   "DS18B20-1": { "Id": "0316A2799EFF", "Temperature": 21.44 },
//!   "RPI": { "Id": "00000000abcdef12", "Temperature": 48.312 }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::MIN_UPDATE_INTERVAL_SECS;
use crate::mqtt::publisher::Publisher;
use crate::mqtt::topics::Topics;
use crate::sensors::onewire::DS18B20;
use crate::sensors::{HostHealth, TemperatureReader};

pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Temperature")]
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub time: String,
    pub sensors: Vec<(String, SnapshotEntry)>,
    pub host: Option<SnapshotEntry>,
}

impl TelemetrySnapshot {
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("Time".to_string(), Value::String(self.time.clone()));
        for (key, entry) in &self.sensors {
            object.insert(key.clone(), entry_json(entry));
        }
        if let Some(host) = &self.host {
            object.insert("RPI".to_string(), entry_json(host));
        }
        Value::Object(object)
    }
}

fn entry_json(entry: &SnapshotEntry) -> Value {
    serde_json::to_value(entry).unwrap_or(Value::Null)
}

/// Strips a family-code prefix (`28-`) and uppercases the serial
pub fn normalize_sensor_id(id: &str) -> String {
    let serial = match id.find('-') {
        Some(idx) if idx > 0 => &id[idx + 1..],
        _ => id,
    };
    serial.to_uppercase()
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct TelemetryPublisher {
    reader: TemperatureReader,
    host: Arc<dyn HostHealth>,
    publisher: Arc<dyn Publisher>,
    topics: Topics,
    interval: Duration,
}

impl TelemetryPublisher {
    pub fn new(
        reader: TemperatureReader,
        host: Arc<dyn HostHealth>,
        publisher: Arc<dyn Publisher>,
        topics: Topics,
        interval_secs: u64,
    ) -> Self {
        Self {
            reader,
            host,
            publisher,
            topics,
            interval: Duration::from_secs(interval_secs.max(MIN_UPDATE_INTERVAL_SECS)),
        }
    }

    pub async fn snapshot(&self, now: DateTime<Utc>) -> TelemetrySnapshot {
        let mut sensors = Vec::new();
        let mut ordinal = 1;
        for sensor in self.reader.sensors() {
            if sensor.sensor_type != DS18B20 {
                continue;
            }
            // read errors are logged by the reader; the entry is just omitted
            let Ok(celsius) = self.reader.read_celsius(&sensor.id).await else {
                continue;
            };
            sensors.push((
                format!("{}-{}", DS18B20, ordinal),
                SnapshotEntry {
                    id: normalize_sensor_id(&sensor.id),
                    temperature: round2(celsius),
                },
            ));
            ordinal += 1;
        }

        let host = match self.host.reading().await {
            Ok(reading) => Some(SnapshotEntry {
                id: reading.serial,
                temperature: reading.cpu_celsius,
            }),
            Err(e) => {
                warn!("telemetry: host health unavailable: {}", e);
                None
            }
        };

        TelemetrySnapshot {
            time: now.format(TIME_FORMAT).to_string(),
            sensors,
            host,
        }
    }

    pub async fn publish_once(&self) {
        let snapshot = self.snapshot(Utc::now()).await;
        let payload = snapshot.to_json().to_string();
        let topic = self.topics.telemetry();
        match self
            .publisher
            .publish(&topic, payload.into_bytes(), false)
            .await
        {
            Ok(()) => debug!("telemetry: published {} sensor entries", snapshot.sensors.len()),
            Err(e) => warn!("telemetry: publish failed: {}", e),
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "starting sampling loop every {} seconds",
            self.interval.as_secs()
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("telemetry: stopping");
                    break;
                }
                _ = interval.tick() => self.publish_once().await,
            }
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
