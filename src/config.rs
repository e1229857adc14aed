//! Controller configuration loaded from a TOML file.
//!
//! All sections map one-to-one onto the subsystems spawned by `main`:
//! MQTT connection, one-wire sensors, digital outputs, the thermostat and
//! the HiLink SMS gateway. Floors for the loop intervals are applied on
//! load so that every consumer sees sane values.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Minimum telemetry publish interval in seconds
pub const MIN_UPDATE_INTERVAL_SECS: u64 = 3;
/// Minimum thermostat tick interval in seconds
pub const MIN_THERMOSTAT_RUNTIME_SECS: u64 = 10;

const CONFIG_ENV_VAR: &str = "FORTINO_CONFIG";
const CONFIG_DIR: &str = "fortino";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct FortinoConfig {
    pub mqtt: MqttSettings,

    /// Telemetry publish interval in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    #[serde(default)]
    pub outputs: Vec<DigitalOutputConfig>,

    #[serde(default)]
    pub onewire: Vec<OneWireSensorConfig>,

    #[serde(default)]
    pub hilink: HiLinkConfig,

    #[serde(default)]
    pub thermostat: ThermostatConfig,

    #[serde(default)]
    pub paths: HostPaths,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MqttSettings {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Device id used in every topic (`tele/<topic>/...`)
    pub topic: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct DigitalOutputConfig {
    /// Logical actuator name; several entries may share one name
    pub name: String,
    pub pin: u8,
    #[serde(default)]
    pub inverted_logic: bool,
    /// Logical state applied at startup
    #[serde(default)]
    pub initial: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct OneWireSensorConfig {
    pub name: String,
    pub id: String,
    #[serde(rename = "type", default = "default_sensor_type")]
    pub sensor_type: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct HiLinkConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub allowed_phones: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ThermostatConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_setpoint")]
    pub setpoint: f64,
    #[serde(default)]
    pub actuator: String,
    #[serde(default)]
    pub feedback_name: String,
    #[serde(default = "default_hysteresis")]
    pub hysteresis: f64,
    /// Regulation tick interval in seconds
    #[serde(default = "default_runtime")]
    pub runtime: u64,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            setpoint: default_setpoint(),
            actuator: String::new(),
            feedback_name: String::new(),
            hysteresis: default_hysteresis(),
            runtime: default_runtime(),
        }
    }
}

/// Filesystem roots of the kernel interfaces, overridable for development hosts
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HostPaths {
    #[serde(default = "default_w1_devices")]
    pub w1_devices: PathBuf,
    #[serde(default = "default_cpuinfo")]
    pub cpuinfo: PathBuf,
    #[serde(default = "default_thermal_zone")]
    pub thermal_zone: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            w1_devices: default_w1_devices(),
            cpuinfo: default_cpuinfo(),
            thermal_zone: default_thermal_zone(),
        }
    }
}

fn default_update_interval() -> u64 {
    10
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_keep_alive() -> u64 {
    30
}
fn default_client_id() -> String {
    "FORTINO".to_string()
}
fn default_sensor_type() -> String {
    "DS18B20".to_string()
}
fn default_setpoint() -> f64 {
    18.0
}
fn default_hysteresis() -> f64 {
    0.5
}
fn default_runtime() -> u64 {
    60
}
fn default_w1_devices() -> PathBuf {
    PathBuf::from("/sys/bus/w1/devices")
}
fn default_cpuinfo() -> PathBuf {
    PathBuf::from("/proc/cpuinfo")
}
fn default_thermal_zone() -> PathBuf {
    PathBuf::from("/sys/class/thermal/thermal_zone0/temp")
}

impl FortinoConfig {
    /// Parses a config document and applies the interval floors
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: FortinoConfig = toml::from_str(content)?;
        config.apply_floors();
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        let config = Self::from_toml(&content)?;
        debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Resolves the config path: CLI argument, `FORTINO_CONFIG`, user config dir, cwd
    pub fn resolve_path(cli_arg: Option<String>) -> PathBuf {
        if let Some(arg) = cli_arg {
            return PathBuf::from(arg);
        }
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            return PathBuf::from(env_path);
        }
        if let Some(mut dir) = dirs::config_dir() {
            dir.push(CONFIG_DIR);
            dir.push(CONFIG_FILE);
            if dir.exists() {
                return dir;
            }
        }
        PathBuf::from(CONFIG_FILE)
    }

    fn apply_floors(&mut self) {
        if self.update_interval < MIN_UPDATE_INTERVAL_SECS {
            warn!(
                "update_interval {}s below minimum, using {}s",
                self.update_interval, MIN_UPDATE_INTERVAL_SECS
            );
            self.update_interval = MIN_UPDATE_INTERVAL_SECS;
        }
        if self.thermostat.runtime < MIN_THERMOSTAT_RUNTIME_SECS {
            warn!(
                "thermostat runtime {}s below minimum, using {}s",
                self.thermostat.runtime, MIN_THERMOSTAT_RUNTIME_SECS
            );
            self.thermostat.runtime = MIN_THERMOSTAT_RUNTIME_SECS;
        }
    }

    // Hysteresis and feedback sensor are checked by the regulator itself,
    // so a bad thermostat section never stops the other subsystems.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.topic.is_empty() {
            return Err(ConfigError::Invalid("mqtt.topic must not be empty".into()));
        }
        if self.hilink.enabled && self.hilink.address.is_empty() {
            return Err(ConfigError::Invalid(
                "hilink.address is required when the gateway is enabled".into(),
            ));
        }
        // the HTTP client is built without TLS
        if self.hilink.address.contains("://") && !self.hilink.address.starts_with("http://") {
            return Err(ConfigError::Invalid(format!(
                "hilink.address '{}' must be plain http",
                self.hilink.address
            )));
        }
        Ok(())
    }
}
