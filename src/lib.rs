pub mod actuator;
pub mod command;
pub mod config;
pub mod mqtt;
pub mod sensors;
pub mod sms;
pub mod telemetry;
pub mod thermostat;
