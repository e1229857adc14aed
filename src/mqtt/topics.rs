//! Topic layout shared by every publisher and the command subscription.
//!
//! ```text
//! tele/<device>/SENSOR    telemetry snapshot
//! tele/<device>/LWT       retained Online/Offline
//! stat/<device>/<output>  actuator status ("true"/"false")
//! cmnd/<device>/+         inbound commands
//! ```

pub const LWT_ONLINE: &str = "Online";
pub const LWT_OFFLINE: &str = "Offline";

/// Suffix of the setpoint command topic
pub const TEMP_TARGET_SET: &str = "TEMPTARGETSET";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    device: String,
}

impl Topics {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn telemetry(&self) -> String {
        format!("tele/{}/SENSOR", self.device)
    }

    pub fn lwt(&self) -> String {
        format!("tele/{}/LWT", self.device)
    }

    pub fn status(&self, output: &str) -> String {
        format!("stat/{}/{}", self.device, output)
    }

    pub fn command_filter(&self) -> String {
        format!("cmnd/{}/+", self.device)
    }
}
