use color_eyre::{eyre::eyre, Result};
use fortino::actuator::{ActuatorController, PinOutcome, RppalGpio};
use fortino::command::CommandRouter;
use fortino::config::FortinoConfig;
use fortino::mqtt::{announce_offline, MqttConnection, MqttPublisher, Topics};
use fortino::sensors::{SysfsHostHealth, SysfsOneWireBus, TemperatureReader};
use fortino::sms::{CommandHandler, HiLinkSession, ReqwestTransport, SmsPoller};
use fortino::telemetry::TelemetryPublisher;
use fortino::thermostat::{self, SetpointHandle};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = FortinoConfig::resolve_path(std::env::args().nth(1));
    let config = FortinoConfig::load(&config_path)
        .await
        .map_err(|e| eyre!("Failed to load {}: {}", config_path.display(), e))?;

    let topics = Topics::new(config.mqtt.topic.clone());
    let setpoint = SetpointHandle::new(config.thermostat.setpoint)
        .map_err(|e| eyre!("Invalid thermostat setpoint: {}", e))?;

    info!("Connecting to MQTT broker {}:{}", config.mqtt.host, config.mqtt.port);
    let connection = MqttConnection::new(
        &config.mqtt,
        topics.clone(),
        CommandRouter::new(setpoint.clone()),
    );
    let client = connection.client();
    let publisher = Arc::new(MqttPublisher::new(client.clone()));

    // the connection outlives the workers so their last publishes go out
    let mqtt_cancel = CancellationToken::new();
    let connection_handle = connection.spawn(mqtt_cancel.clone());
    let cancel = CancellationToken::new();

    // without GPIO the outputs and the thermostat stay down, the rest runs
    let actuators = match RppalGpio::open() {
        Ok(gpio) => {
            let actuators = Arc::new(ActuatorController::new(
                Arc::new(gpio),
                publisher.clone(),
                topics.clone(),
                config.outputs.clone(),
            ));
            let failed = actuators
                .initialize()
                .await
                .iter()
                .filter(|(_, outcome)| matches!(outcome, PinOutcome::Failed(_)))
                .count();
            if failed > 0 {
                warn!("{} output pin(s) could not be initialized", failed);
            }
            Some(actuators)
        }
        Err(e) => {
            error!("Outputs disabled: {}", e);
            None
        }
    };

    let reader = TemperatureReader::new(
        Arc::new(SysfsOneWireBus::new(config.paths.w1_devices.clone())),
        config.onewire.clone(),
    );
    let host = Arc::new(SysfsHostHealth::new(
        config.paths.cpuinfo.clone(),
        config.paths.thermal_zone.clone(),
    ));

    let mut tasks = Vec::new();
    tasks.push(
        TelemetryPublisher::new(
            reader.clone(),
            host,
            publisher.clone(),
            topics.clone(),
            config.update_interval,
        )
        .spawn(cancel.clone()),
    );

    match (&actuators, config.thermostat.enabled) {
        (Some(actuators), true) => tasks.push(thermostat::regulator::spawn(
            config.thermostat.clone(),
            reader.clone(),
            actuators.clone(),
            setpoint.clone(),
            cancel.clone(),
        )),
        (None, true) => error!("Thermostat not started: outputs are unavailable"),
        (_, false) => info!("Thermostat disabled"),
    }

    if config.hilink.enabled {
        match ReqwestTransport::new(&config.hilink.address) {
            Ok(transport) => {
                let poller = SmsPoller::new(
                    HiLinkSession::new(Arc::new(transport)),
                    CommandHandler::new(setpoint.clone(), reader.clone()),
                    config.hilink.allowed_phones.clone(),
                );
                tasks.push(poller.spawn(cancel.clone()));
            }
            Err(e) => error!("SMS gateway not started: {}", e),
        }
    } else {
        info!("SMS gateway disabled");
    }

    wait_for_shutdown().await?;
    info!("Shutting down");

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            warn!("Task ended abnormally: {}", e);
        }
    }
    announce_offline(&client, &topics).await;
    mqtt_cancel.cancel();
    if let Err(e) = connection_handle.await {
        warn!("MQTT task ended abnormally: {}", e);
    }

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
