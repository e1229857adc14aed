//! Logical actuator control with read-back verification.
//!
//! A logical output name fans out to one or more physical pins. Each pin is
//! written, given time to settle and read back; the logical state is then
//! published once to `stat/<device>/<name>`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::gpio::{GpioPort, PinLevel};
use crate::config::DigitalOutputConfig;
use crate::mqtt::publisher::Publisher;
use crate::mqtt::topics::Topics;

/// Time between writing a pin and reading it back
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Actuator '{0}' does not match any configured output")]
    UnknownActuator(String),
}

/// Outcome for a single physical pin of an `initialize` or `set_output` call
#[derive(Debug, Clone, PartialEq)]
pub enum PinOutcome {
    Confirmed(PinLevel),
    Mismatch { expected: PinLevel, actual: PinLevel },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputReport {
    pub name: String,
    pub state: bool,
    pub pins: Vec<(u8, PinOutcome)>,
    pub status_published: bool,
}

impl OutputReport {
    pub fn all_confirmed(&self) -> bool {
        self.pins
            .iter()
            .all(|(_, outcome)| matches!(outcome, PinOutcome::Confirmed(_)))
    }
}

pub struct ActuatorController {
    gpio: Arc<dyn GpioPort>,
    publisher: Arc<dyn Publisher>,
    topics: Topics,
    outputs: Vec<DigitalOutputConfig>,
    // one lock per physical pin, held across write -> settle -> read
    pin_locks: HashMap<u8, Mutex<()>>,
    settle_delay: Duration,
}

impl ActuatorController {
    pub fn new(
        gpio: Arc<dyn GpioPort>,
        publisher: Arc<dyn Publisher>,
        topics: Topics,
        outputs: Vec<DigitalOutputConfig>,
    ) -> Self {
        let pin_locks = outputs.iter().map(|o| (o.pin, Mutex::new(()))).collect();
        Self {
            gpio,
            publisher,
            topics,
            outputs,
            pin_locks,
            settle_delay: SETTLE_DELAY,
        }
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|o| o.name == name)
    }

    /// Puts every configured pin into output mode at its initial state.
    ///
    /// A pin that cannot be configured is reported and skipped; the others
    /// are still brought up.
    pub async fn initialize(&self) -> Vec<(u8, PinOutcome)> {
        let mut summary = String::new();
        let mut pins = Vec::with_capacity(self.outputs.len());
        for output in &self.outputs {
            let level = PinLevel::for_state(output.initial, output.inverted_logic);
            let _guard = self.lock_pin(output.pin).await;
            let outcome = match self.gpio.configure_output(output.pin, level) {
                Ok(()) => {
                    summary.push_str(&format!(" pin {} OUT [{}]", output.pin, level));
                    PinOutcome::Confirmed(level)
                }
                Err(e) => {
                    error!("pin {} ('{}') init failed: {}", output.pin, output.name, e);
                    PinOutcome::Failed(e.to_string())
                }
            };
            pins.push((output.pin, outcome));
        }
        info!("digital I/O init:{}", summary);
        pins
    }

    /// Drives every pin mapped to `name` and publishes the logical state once
    pub async fn set_output(&self, name: &str, on: bool) -> Result<OutputReport, ActuatorError> {
        let matching: Vec<&DigitalOutputConfig> =
            self.outputs.iter().filter(|o| o.name == name).collect();
        if matching.is_empty() {
            error!("actuator '{}' didn't match any configured output", name);
            return Err(ActuatorError::UnknownActuator(name.to_string()));
        }

        let mut pins = Vec::with_capacity(matching.len());
        for output in matching {
            let expected = PinLevel::for_state(on, output.inverted_logic);
            let outcome = self.drive_pin(output.pin, expected).await;
            pins.push((output.pin, outcome));
        }

        let status_published = self.publish_status(name, on).await;
        Ok(OutputReport {
            name: name.to_string(),
            state: on,
            pins,
            status_published,
        })
    }

    async fn lock_pin(&self, pin: u8) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match self.pin_locks.get(&pin) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }

    async fn drive_pin(&self, pin: u8, expected: PinLevel) -> PinOutcome {
        let _guard = self.lock_pin(pin).await;

        if let Err(e) = self.gpio.write(pin, expected) {
            error!("pin {} write failed: {}", pin, e);
            return PinOutcome::Failed(e.to_string());
        }
        tokio::time::sleep(self.settle_delay).await;

        match self.gpio.read(pin) {
            Ok(actual) if actual == expected => {
                debug!("pin {} confirmed {}", pin, actual);
                PinOutcome::Confirmed(actual)
            }
            Ok(actual) => {
                warn!("pin {} set to {} but feedback is {}", pin, expected, actual);
                PinOutcome::Mismatch { expected, actual }
            }
            Err(e) => {
                error!("pin {} read-back failed: {}", pin, e);
                PinOutcome::Failed(e.to_string())
            }
        }
    }

    async fn publish_status(&self, name: &str, on: bool) -> bool {
        let topic = self.topics.status(name);
        let payload = if on { "true" } else { "false" };
        match self
            .publisher
            .publish(&topic, payload.as_bytes().to_vec(), false)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("mqtt: error publishing status of '{}': {}", name, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::gpio::tests::{FakeGpio, GpioCall};
    use crate::mqtt::publisher::tests::RecordingPublisher;

    fn output(name: &str, pin: u8, inverted_logic: bool) -> DigitalOutputConfig {
        DigitalOutputConfig {
            name: name.to_string(),
            pin,
            inverted_logic,
            initial: false,
        }
    }

    async fn controller(
        gpio: Arc<FakeGpio>,
        publisher: Arc<RecordingPublisher>,
        outputs: Vec<DigitalOutputConfig>,
    ) -> ActuatorController {
        let controller =
            ActuatorController::new(gpio, publisher, Topics::new("fortino"), outputs)
                .with_settle_delay(Duration::ZERO);
        controller.initialize().await;
        controller
    }

    #[tokio::test]
    async fn initialize_applies_initial_levels() {
        let gpio = Arc::new(FakeGpio::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let mut pump = output("pump", 5, true);
        pump.initial = false;
        let mut light = output("light", 6, false);
        light.initial = true;

        controller(gpio.clone(), publisher, vec![pump, light]).await;
        assert_eq!(gpio.level(5), Some(PinLevel::High));
        assert_eq!(gpio.level(6), Some(PinLevel::High));
    }

    #[tokio::test]
    async fn initialize_skips_broken_pin_and_configures_the_rest() {
        let gpio = Arc::new(FakeGpio::with_broken(&[99]));
        let publisher = Arc::new(RecordingPublisher::default());
        let ctrl = ActuatorController::new(
            gpio.clone(),
            publisher,
            Topics::new("fortino"),
            vec![output("light", 99, false), output("heater", 17, false)],
        );

        let pins = ctrl.initialize().await;

        assert_eq!(pins.len(), 2);
        assert!(matches!(pins[0], (99, PinOutcome::Failed(_))));
        assert_eq!(pins[1], (17, PinOutcome::Confirmed(PinLevel::Low)));
        assert_eq!(gpio.level(17), Some(PinLevel::Low));
        assert_eq!(gpio.level(99), None);
    }

    #[tokio::test]
    async fn inverted_output_drives_inactive_level_but_publishes_logical_state() {
        let gpio = Arc::new(FakeGpio::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let ctrl = controller(gpio.clone(), publisher.clone(), vec![output("valve", 4, true)]).await;

        let report = ctrl.set_output("valve", true).await.unwrap();

        assert_eq!(gpio.level(4), Some(PinLevel::Low));
        assert!(report.all_confirmed());
        let published = publisher.take();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "stat/fortino/valve");
        assert_eq!(published[0].payload, "true");
        assert!(!published[0].retained);
    }

    #[tokio::test]
    async fn fan_out_writes_every_pin_and_publishes_once() {
        let gpio = Arc::new(FakeGpio::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let ctrl = controller(
            gpio.clone(),
            publisher.clone(),
            vec![output("heater", 17, false), output("heater", 27, true)],
        )
        .await;

        let report = ctrl.set_output("heater", true).await.unwrap();

        assert_eq!(report.pins.len(), 2);
        assert_eq!(gpio.level(17), Some(PinLevel::High));
        assert_eq!(gpio.level(27), Some(PinLevel::Low));
        assert_eq!(publisher.take().len(), 1);
    }

    #[tokio::test]
    async fn feedback_mismatch_is_reported_not_fatal() {
        let gpio = Arc::new(FakeGpio::with_stuck(&[9]));
        let publisher = Arc::new(RecordingPublisher::default());
        let ctrl = controller(gpio.clone(), publisher.clone(), vec![output("fan", 9, false)]).await;

        let report = ctrl.set_output("fan", true).await.unwrap();

        assert_eq!(
            report.pins,
            vec![(
                9,
                PinOutcome::Mismatch {
                    expected: PinLevel::High,
                    actual: PinLevel::Low
                }
            )]
        );
        assert!(report.status_published);
        assert_eq!(gpio.writes(), vec![(9, PinLevel::High)]);
    }

    #[tokio::test]
    async fn unknown_actuator_is_an_error_without_publish() {
        let gpio = Arc::new(FakeGpio::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let ctrl = controller(gpio, publisher.clone(), vec![output("heater", 17, false)]).await;

        assert!(matches!(
            ctrl.set_output("boiler", true).await,
            Err(ActuatorError::UnknownActuator(_))
        ));
        assert!(publisher.take().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_the_write() {
        let gpio = Arc::new(FakeGpio::default());
        let publisher = Arc::new(RecordingPublisher::failing());
        let ctrl = controller(gpio.clone(), publisher, vec![output("heater", 17, false)]).await;

        let report = ctrl.set_output("heater", true).await.unwrap();
        assert!(!report.status_published);
        assert_eq!(gpio.level(17), Some(PinLevel::High));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_writes_to_one_pin_do_not_interleave() {
        let gpio = Arc::new(FakeGpio::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let ctrl = ActuatorController::new(
            gpio.clone(),
            publisher.clone(),
            Topics::new("fortino"),
            vec![output("heater", 17, false)],
        );
        ctrl.initialize().await;

        let (on, off) = tokio::join!(
            ctrl.set_output("heater", true),
            ctrl.set_output("heater", false)
        );

        // each read-back sees its own write, not the other caller's
        assert!(on.unwrap().all_confirmed());
        assert!(off.unwrap().all_confirmed());
        let calls = gpio.calls();
        assert_eq!(calls.len(), 4);
        for pair in calls.chunks(2) {
            assert!(matches!(pair, [GpioCall::Write(17, _), GpioCall::Read(17)]));
        }
        assert_eq!(publisher.take().len(), 2);
    }
}
