//! Broker connection: options with last will, the event loop task and
//! dispatch of inbound commands.

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::topics::{Topics, LWT_OFFLINE, LWT_ONLINE};
use crate::command::{CommandOutcome, CommandRouter};
use crate::config::MqttSettings;

pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const CHANNEL_CAPACITY: usize = 10;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    Reconnecting,
}

pub fn mqtt_options(settings: &MqttSettings, topics: &Topics) -> MqttOptions {
    let mut options = MqttOptions::new(
        settings.client_id.clone(),
        settings.host.clone(),
        settings.port,
    );
    options
        .set_keep_alive(Duration::from_secs(settings.keep_alive))
        .set_last_will(LastWill::new(
            topics.lwt(),
            LWT_OFFLINE,
            QoS::AtMostOnce,
            true,
        ));
    if let Some(username) = &settings.username {
        options.set_credentials(
            username.clone(),
            settings.password.clone().unwrap_or_default(),
        );
    }
    options
}

/// Owns the rumqttc event loop; the paired [`AsyncClient`] is handed out
pub struct MqttConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Topics,
    router: CommandRouter,
    state: ConnectionState,
}

impl MqttConnection {
    pub fn new(settings: &MqttSettings, topics: Topics, router: CommandRouter) -> Self {
        let (client, eventloop) =
            AsyncClient::new(mqtt_options(settings, &topics), CHANNEL_CAPACITY);
        Self {
            client,
            eventloop,
            topics,
            router,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                info!("mqtt: connected, subscribing to {}", self.topics.command_filter());
                self.state = ConnectionState::Connected;
                announce_online(&self.client, &self.topics);
            }
            Event::Incoming(Packet::Publish(publish)) => {
                self.on_publish(&publish.topic, &publish.payload).await
            }
            other => debug!("mqtt: {:?}", other),
        }
    }

    async fn on_publish(&mut self, topic: &str, payload: &[u8]) {
        match self.router.handle(topic, payload).await {
            Ok(CommandOutcome::SetpointChanged(value)) => {
                info!("mqtt: setpoint set to {:.1} via {}", value, topic)
            }
            Ok(CommandOutcome::Ignored) => {}
            Err(e) => warn!("mqtt: command on {} rejected: {}", topic, e),
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.eventloop.poll() => event,
            };
            match event {
                Ok(event) => self.handle_event(event).await,
                Err(e) => {
                    error!(
                        "mqtt: connection error: {}, retrying in {}s",
                        e,
                        RECONNECT_BACKOFF.as_secs()
                    );
                    self.state = ConnectionState::Reconnecting;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            }
        }
        self.drain_shutdown().await;
    }

    /// Lets the event loop flush the offline announcement and disconnect
    async fn drain_shutdown(&mut self) {
        if self.state != ConnectionState::Connected {
            self.state = ConnectionState::Disconnected;
            return;
        }
        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(rumqttc::Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_TIMEOUT, flush).await.is_err() {
            warn!("mqtt: disconnect did not complete in time");
        }
        self.state = ConnectionState::Disconnected;
        info!("mqtt: disconnected");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

/// Subscribes to commands and replaces the retained will with `Online`
fn announce_online(client: &AsyncClient, topics: &Topics) {
    if let Err(e) = client.try_subscribe(topics.command_filter(), QoS::AtMostOnce) {
        warn!("mqtt: subscribe request failed: {}", e);
    }
    if let Err(e) = client.try_publish(topics.lwt(), QoS::AtMostOnce, true, LWT_ONLINE) {
        warn!("mqtt: online announcement failed: {}", e);
    }
}

/// Publishes the retained offline status and requests a disconnect
pub async fn announce_offline(client: &AsyncClient, topics: &Topics) {
    let publish = client.publish(topics.lwt(), QoS::AtMostOnce, true, LWT_OFFLINE);
    match tokio::time::timeout(DISCONNECT_TIMEOUT, publish).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("mqtt: offline announcement failed: {}", e),
        Err(_) => warn!("mqtt: offline announcement timed out"),
    }
    match tokio::time::timeout(DISCONNECT_TIMEOUT, client.disconnect()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("mqtt: disconnect request failed: {}", e),
        Err(_) => warn!("mqtt: disconnect request timed out"),
    }
}
