//! Heater thermostat: shared setpoint and the regulation loop.

pub mod regulator;
pub mod setpoint;

pub use regulator::{HeaterState, Regulator, ThermostatError, TickOutcome};
pub use setpoint::{SetpointError, SetpointHandle, MAX_SETPOINT, MIN_SETPOINT};
