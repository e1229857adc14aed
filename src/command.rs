//! Routing of inbound `cmnd/<device>/<COMMAND>` publishes.

use tracing::{debug, warn};

use crate::mqtt::topics::TEMP_TARGET_SET;
use crate::thermostat::{SetpointError, SetpointHandle};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("{command}: failed to parse payload '{payload}'")]
    InvalidPayload { command: String, payload: String },

    #[error(transparent)]
    Setpoint(#[from] SetpointError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    SetpointChanged(f64),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct CommandRouter {
    setpoint: SetpointHandle,
}

impl CommandRouter {
    pub fn new(setpoint: SetpointHandle) -> Self {
        Self { setpoint }
    }

    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Result<CommandOutcome, CommandError> {
        let suffix = format!("/{}", TEMP_TARGET_SET.to_lowercase());
        if !topic.to_lowercase().ends_with(&suffix) {
            debug!("mqtt: ignoring {} ({} bytes)", topic, payload.len());
            return Ok(CommandOutcome::Ignored);
        }

        let raw = String::from_utf8_lossy(payload);
        let value: f64 = raw.trim().parse().map_err(|_| {
            warn!("{} failed to parse temp setpoint '{}'", TEMP_TARGET_SET, raw);
            CommandError::InvalidPayload {
                command: TEMP_TARGET_SET.to_string(),
                payload: raw.to_string(),
            }
        })?;

        match self.setpoint.set(value).await {
            Ok(accepted) => Ok(CommandOutcome::SetpointChanged(accepted)),
            Err(e) => {
                warn!("{}: {}", TEMP_TARGET_SET, e);
                Err(e.into())
            }
        }
    }
}
