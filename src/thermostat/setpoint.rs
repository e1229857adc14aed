//! Shared thermostat setpoint.
//!
//! The regulator, the MQTT command router and the SMS command handler all
//! touch the setpoint. They share one [`SetpointHandle`]; the value behind
//! it is only reachable through `get`/`set`, and `set` validates.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub const MIN_SETPOINT: f64 = 8.0;
pub const MAX_SETPOINT: f64 = 20.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SetpointError {
    #[error("invalid setpoint {0:.1}, allowed range is [8.0, 20.0]")]
    InvalidSetpoint(f64),
}

pub fn validate(value: f64) -> Result<f64, SetpointError> {
    if value.is_finite() && (MIN_SETPOINT..=MAX_SETPOINT).contains(&value) {
        Ok(value)
    } else {
        Err(SetpointError::InvalidSetpoint(value))
    }
}

#[derive(Debug, Clone)]
pub struct SetpointHandle {
    value: Arc<Mutex<f64>>,
}

impl SetpointHandle {
    pub fn new(initial: f64) -> Result<Self, SetpointError> {
        let initial = validate(initial)?;
        Ok(Self {
            value: Arc::new(Mutex::new(initial)),
        })
    }

    pub async fn get(&self) -> f64 {
        *self.value.lock().await
    }

    /// Replaces the setpoint if `value` lies within the allowed range
    pub async fn set(&self, value: f64) -> Result<f64, SetpointError> {
        let value = validate(value)?;
        *self.value.lock().await = value;
        info!("thermostat: set point = {:.1}", value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_inclusive_bounds() {
        let handle = SetpointHandle::new(18.0).unwrap();
        assert_eq!(handle.set(8.0).await, Ok(8.0));
        assert_eq!(handle.set(20.0).await, Ok(20.0));
        assert_eq!(handle.get().await, 20.0);
    }

    #[tokio::test]
    async fn rejects_out_of_range_without_change() {
        let handle = SetpointHandle::new(18.0).unwrap();
        assert_eq!(handle.set(7.9).await, Err(SetpointError::InvalidSetpoint(7.9)));
        assert!(handle.set(20.1).await.is_err());
        assert!(handle.set(f64::NAN).await.is_err());
        assert_eq!(handle.get().await, 18.0);
    }

    #[test]
    fn initial_value_is_validated() {
        assert!(SetpointHandle::new(25.0).is_err());
    }

    #[tokio::test]
    async fn clones_share_the_value() {
        let handle = SetpointHandle::new(18.0).unwrap();
        let other = handle.clone();
        other.set(12.5).await.unwrap();
        assert_eq!(handle.get().await, 12.5);
    }
}
