//! Digital outputs: GPIO access and the logical actuator controller.
//!
//! ```text
//! set_output("heater", on) ──► pin 17 write/settle/read ─┐
//!                          └─► pin 27 write/settle/read ─┴─► stat/<device>/heater
//! ```

pub mod controller;
pub mod gpio;

pub use controller::{ActuatorController, ActuatorError, OutputReport, PinOutcome};
pub use gpio::{GpioError, GpioPort, PinLevel, RppalGpio};
