//! Hysteresis (bang-bang) heater regulation.
//!
//! The regulator lifecycle is a statum typestate: a `Regulator<Configured>`
//! only becomes a `Regulator<Running>` once its configuration has been
//! checked, so the tick loop never runs against an unresolved feedback
//! sensor or a negative hysteresis.
//!
//! Within `Running` the heater itself is a two-state runtime machine:
//!
//! ```text
//!            error > hysteresis
//!   Idle ─────────────────────────► Heating
//!    ▲                                 │
//!    └──────── error < -hysteresis ────┘
//! ```
//!
//! with `error = setpoint - current`.

use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::setpoint::SetpointHandle;
use crate::actuator::ActuatorController;
use crate::config::{ThermostatConfig, MIN_THERMOSTAT_RUNTIME_SECS};
use crate::sensors::TemperatureReader;

/// Interval after which the heater state is re-asserted to the actuator
pub const FORCED_PUBLISH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Delay before the first tick after start-up
pub const STARTUP_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThermostatError {
    #[error("hysteresis can not be negative: {0}")]
    NegativeHysteresis(f64),

    #[error("invalid feedback sensor '{0}'")]
    UnknownFeedbackSensor(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterState {
    Idle,
    Heating,
}

impl HeaterState {
    pub fn is_on(self) -> bool {
        matches!(self, HeaterState::Heating)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Feedback read failed; nothing was written
    SensorUnavailable,
    Evaluated {
        current: f64,
        error: f64,
        heater: HeaterState,
        switched: bool,
        reasserted: bool,
    },
}

#[state]
#[derive(Debug, Clone)]
pub enum RegulatorLifecycle {
    Configured,
    Running,
}

#[machine]
pub struct Regulator<S: RegulatorLifecycle> {
    settings: ThermostatConfig,
    reader: TemperatureReader,
    actuators: Arc<ActuatorController>,
    setpoint: SetpointHandle,

    // resolved on start
    feedback_id: String,
    period: Duration,

    heater: HeaterState,
    last_forced: Option<Instant>,
}

impl<S: RegulatorLifecycle> Regulator<S> {
    pub fn heater(&self) -> HeaterState {
        self.heater
    }
}

impl Regulator<Configured> {
    pub fn create(
        settings: ThermostatConfig,
        reader: TemperatureReader,
        actuators: Arc<ActuatorController>,
        setpoint: SetpointHandle,
    ) -> Self {
        debug!("thermostat: creating regulator with {:?}", settings);
        Self::new(
            settings,
            reader,
            actuators,
            setpoint,
            String::new(),
            Duration::ZERO,
            HeaterState::Idle,
            None,
        )
    }

    /// Validates the configuration and transitions to `Running`
    pub fn start(mut self) -> Result<Regulator<Running>, ThermostatError> {
        let hysteresis = self.settings.hysteresis;
        if hysteresis.is_nan() || hysteresis < 0.0 {
            error!("thermostat: hysteresis can not be negative ({})", hysteresis);
            return Err(ThermostatError::NegativeHysteresis(hysteresis));
        }

        let feedback_name = self.settings.feedback_name.clone();
        self.feedback_id = match self.reader.sensor_by_name(&feedback_name) {
            Some(sensor) => sensor.id.clone(),
            None => {
                error!("thermostat: invalid feedback {}", feedback_name);
                return Err(ThermostatError::UnknownFeedbackSensor(feedback_name));
            }
        };

        if !self.actuators.has_output(&self.settings.actuator) {
            warn!(
                "thermostat: actuator '{}' has no configured output",
                self.settings.actuator
            );
        }

        self.period = Duration::from_secs(self.settings.runtime.max(MIN_THERMOSTAT_RUNTIME_SECS));
        info!(
            "thermostat: starting with runtime {} seconds, feedback {} ({})",
            self.period.as_secs(),
            feedback_name,
            self.feedback_id
        );
        Ok(self.transition())
    }
}

impl Regulator<Running> {
    /// Runs one regulation step
    pub async fn tick(&mut self) -> TickOutcome {
        let current = match self.reader.read_celsius(&self.feedback_id).await {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    "thermostat: error reading temp from {}, keeping heater {:?}: {}",
                    self.feedback_id, self.heater, e
                );
                return TickOutcome::SensorUnavailable;
            }
        };

        let setpoint = self.setpoint.get().await;
        let hysteresis = self.settings.hysteresis;
        let error = setpoint - current;
        let mut switched = false;

        if error > hysteresis && self.heater == HeaterState::Idle {
            info!("thermostat: temp error is {:.1}, turning on the actuator", error);
            self.heater = HeaterState::Heating;
            self.drive(true).await;
            switched = true;
        } else if error < -hysteresis && self.heater == HeaterState::Heating {
            info!("thermostat: temp error is {:.1}, turning off the actuator", error);
            self.heater = HeaterState::Idle;
            self.drive(false).await;
            switched = true;
        }

        debug!(
            "thermostat: setpoint {:.1}, feedback {:.1}, heater {:?}",
            setpoint, current, self.heater
        );

        let now = Instant::now();
        let reassert_due = self
            .last_forced
            .map_or(true, |last| now.duration_since(last) >= FORCED_PUBLISH_INTERVAL);
        if reassert_due {
            self.last_forced = Some(now);
            self.drive(self.heater.is_on()).await;
        }

        TickOutcome::Evaluated {
            current,
            error,
            heater: self.heater,
            switched,
            reasserted: reassert_due,
        }
    }

    async fn drive(&self, on: bool) {
        if let Err(e) = self.actuators.set_output(&self.settings.actuator, on).await {
            error!("thermostat: failed to drive actuator: {}", e);
        }
    }

    /// Ticks forever until `cancel` fires; a running tick always completes
    pub async fn run(mut self, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(STARTUP_GRACE) => {}
        }

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("thermostat: stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }
}

/// Spawns the thermostat task; start-up failures end this task only
pub fn spawn(
    settings: ThermostatConfig,
    reader: TemperatureReader,
    actuators: Arc<ActuatorController>,
    setpoint: SetpointHandle,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let regulator = Regulator::create(settings, reader, actuators, setpoint);
    tokio::spawn(async move {
        match regulator.start() {
            Ok(running) => running.run(cancel).await,
            Err(e) => error!("thermostat: not started: {}", e),
        }
    })
}
