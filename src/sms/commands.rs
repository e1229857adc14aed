//! Text commands accepted over SMS.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::sensors::TemperatureReader;
use crate::thermostat::SetpointHandle;

pub const HELP_TEXT: &str = "puoi inviare:\naiuto\ntemp";
pub const INVALID_COMMAND: &str = "invalid command";

static SET_SETPOINT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^term\s+([0-9]{1,2})$").ok());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmsCommand {
    Help,
    Temperatures,
    QuerySetpoint,
    SetSetpoint(u8),
    Unknown,
}

impl SmsCommand {
    pub fn parse(content: &str) -> Self {
        let text = content.trim();
        let lowered = text.to_lowercase();
        match lowered.as_str() {
            "aiuto" | "help" => return SmsCommand::Help,
            "temp" => return SmsCommand::Temperatures,
            "term" => return SmsCommand::QuerySetpoint,
            _ => {}
        }

        SET_SETPOINT_PATTERN
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .map_or(SmsCommand::Unknown, SmsCommand::SetSetpoint)
    }
}

/// Turns an inbound SMS into the reply text, if any
#[derive(Clone)]
pub struct CommandHandler {
    setpoint: SetpointHandle,
    reader: TemperatureReader,
}

impl CommandHandler {
    pub fn new(setpoint: SetpointHandle, reader: TemperatureReader) -> Self {
        Self { setpoint, reader }
    }

    pub async fn respond(&self, phone: &str, content: &str) -> Option<String> {
        match SmsCommand::parse(content) {
            SmsCommand::Help => Some(HELP_TEXT.to_string()),
            SmsCommand::Temperatures => Some(self.temperatures().await),
            SmsCommand::QuerySetpoint => {
                Some(format!("t_setpoint = {:.1}", self.setpoint.get().await))
            }
            SmsCommand::SetSetpoint(value) => match self.setpoint.set(f64::from(value)).await {
                Ok(_) => {
                    info!("sms: {} changed thermostat setpoint to {} C", phone, value);
                    Some(format!("Ok, temp = {value} C"))
                }
                Err(e) => {
                    warn!("sms: {} sent rejected setpoint: {}", phone, e);
                    Some(INVALID_COMMAND.to_string())
                }
            },
            SmsCommand::Unknown => {
                info!("sms: no command matches '{}'", content.trim());
                None
            }
        }
    }

    async fn temperatures(&self) -> String {
        let mut body = String::new();
        for (sensor, result) in self.reader.read_all().await {
            if let Ok(celsius) = result {
                body.push_str(&format!("{}: {:.1}\n", sensor.id, celsius));
            }
        }
        body
    }
}
