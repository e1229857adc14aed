//! Outbound publishing with a bounded wait.

use async_trait::async_trait;
use rumqttc::{AsyncClient, QoS};
use std::time::Duration;
use tracing::debug;

/// Default bound for a single publish
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publish to {0} timed out")]
    Timeout(String),

    #[error("Client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>, retained: bool)
        -> Result<(), PublishError>;
}

/// [`Publisher`] backed by the rumqttc request channel
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retained: bool,
    ) -> Result<(), PublishError> {
        let request = self
            .client
            .publish(topic, QoS::AtMostOnce, retained, payload);
        match tokio::time::timeout(PUBLISH_TIMEOUT, request).await {
            Ok(result) => {
                result?;
                debug!("mqtt: published to {} (retained: {})", topic, retained);
                Ok(())
            }
            Err(_) => Err(PublishError::Timeout(topic.to_string())),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Published {
        pub(crate) topic: String,
        pub(crate) payload: String,
        pub(crate) retained: bool,
    }

    /// Records every publish; optionally fails them all
    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        pub(crate) published: Mutex<Vec<Published>>,
        pub(crate) fail: bool,
    }

    impl RecordingPublisher {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn take(&self) -> Vec<Published> {
            std::mem::take(&mut *self.published.lock().unwrap())
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(
            &self,
            topic: &str,
            payload: Vec<u8>,
            retained: bool,
        ) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Timeout(topic.to_string()));
            }
            self.published.lock().unwrap().push(Published {
                topic: topic.to_string(),
                payload: String::from_utf8_lossy(&payload).into_owned(),
                retained,
            });
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publish_gives_up_when_request_queue_is_full() {
        let (tx, requests) = flume::bounded(1);
        let publisher = MqttPublisher::new(AsyncClient::from_senders(tx));

        publisher
            .publish("stat/fortino/heater", b"true".to_vec(), false)
            .await
            .unwrap();
        assert!(matches!(
            publisher
                .publish("stat/fortino/heater", b"false".to_vec(), false)
                .await,
            Err(PublishError::Timeout(topic)) if topic == "stat/fortino/heater"
        ));

        match requests.try_recv().unwrap() {
            rumqttc::Request::Publish(publish) => {
                assert_eq!(&publish.payload[..], b"true");
                assert!(!publish.retain);
            }
            other => panic!("expected publish, got {other:?}"),
        }
    }
}
