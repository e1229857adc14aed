//! Sensor input: DS18B20 sensors on the one-wire bus and host health.
//!
//! ```text
//! sensors/
//! ├── onewire.rs  - w1_slave parsing and the TemperatureReader
//! └── host.rs     - CPU serial and SoC temperature from procfs/sysfs
//! ```
//!
//! Both submodules talk to the kernel through small async traits so that
//! the parsing rules can be exercised without real hardware.

pub mod host;
pub mod onewire;

pub use host::{HostHealth, HostHealthError, HostReading, SysfsHostHealth};
pub use onewire::{OneWireBus, SensorError, SysfsOneWireBus, TemperatureReader};
