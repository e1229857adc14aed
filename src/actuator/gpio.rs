//! GPIO access for digital outputs.
//!
//! [`GpioPort`] is the narrow surface the actuator controller needs: put a
//! pin into output mode, write a level and read the level back. The
//! production implementation uses `rppal`.

use rppal::gpio::{Gpio, Level, OutputPin};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Low,
    High,
}

impl PinLevel {
    /// Physical level for a logical state on a (possibly inverted) output
    pub fn for_state(on: bool, inverted_logic: bool) -> Self {
        if on ^ inverted_logic {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }
}

impl fmt::Display for PinLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PinLevel::Low => write!(f, "LOW"),
            PinLevel::High => write!(f, "HIGH"),
        }
    }
}

impl From<PinLevel> for Level {
    fn from(level: PinLevel) -> Self {
        match level {
            PinLevel::Low => Level::Low,
            PinLevel::High => Level::High,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("GPIO controller unavailable: {0}")]
    Unavailable(String),

    #[error("Pin {0} is not configured as output")]
    NotConfigured(u8),

    #[error("Pin {pin} error: {reason}")]
    Pin { pin: u8, reason: String },
}

pub trait GpioPort: Send + Sync {
    fn configure_output(&self, pin: u8, level: PinLevel) -> Result<(), GpioError>;
    fn write(&self, pin: u8, level: PinLevel) -> Result<(), GpioError>;
    fn read(&self, pin: u8) -> Result<PinLevel, GpioError>;
}

/// Raspberry Pi GPIO through `/dev/gpiomem`
pub struct RppalGpio {
    gpio: Gpio,
    pins: Mutex<HashMap<u8, OutputPin>>,
}

impl RppalGpio {
    pub fn open() -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(|e| GpioError::Unavailable(e.to_string()))?;
        info!("gpio: opened controller");
        Ok(Self {
            gpio,
            pins: Mutex::new(HashMap::new()),
        })
    }

    fn with_pin<T>(
        &self,
        pin: u8,
        op: impl FnOnce(&mut OutputPin) -> T,
    ) -> Result<T, GpioError> {
        let mut pins = self.pins.lock().map_err(|e| GpioError::Pin {
            pin,
            reason: e.to_string(),
        })?;
        let output = pins.get_mut(&pin).ok_or(GpioError::NotConfigured(pin))?;
        Ok(op(output))
    }
}

impl GpioPort for RppalGpio {
    fn configure_output(&self, pin: u8, level: PinLevel) -> Result<(), GpioError> {
        let mut output = self
            .gpio
            .get(pin)
            .map_err(|e| GpioError::Pin {
                pin,
                reason: e.to_string(),
            })?
            .into_output();
        // keep the commanded state when the process exits
        output.set_reset_on_drop(false);
        output.write(level.into());
        debug!("gpio: pin {} configured as output [{}]", pin, level);

        let mut pins = self.pins.lock().map_err(|e| GpioError::Pin {
            pin,
            reason: e.to_string(),
        })?;
        pins.insert(pin, output);
        Ok(())
    }

    fn write(&self, pin: u8, level: PinLevel) -> Result<(), GpioError> {
        self.with_pin(pin, |output| output.write(level.into()))
    }

    fn read(&self, pin: u8) -> Result<PinLevel, GpioError> {
        self.with_pin(pin, |output| {
            if output.is_set_high() {
                PinLevel::High
            } else {
                PinLevel::Low
            }
        })
    }
}
