//! MQTT control channel
//!
//! Publish-style channel to the peripheral controller: the actuator openness
//! scalar goes out on one topic, and volume commands arrive on another to be
//! clamped and forwarded to the device. Publishing is fire-and-forget: a
//! slow or absent broker drops messages, it never stalls the audio path.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;

use crate::config::ControlConfig;
use crate::{Error, Result};

/// Pause before re-polling after a broker connection error
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Queue depth for the MQTT client's request channel
const REQUEST_QUEUE: usize = 32;

/// Connected control channel: the publish handle plus the background event
/// loop driving the broker connection
pub struct ControlChannel {
    publisher: ControlPublisher,
    volume: watch::Receiver<f32>,
}

impl ControlChannel {
    /// Connect to the broker and start the event loop task.
    ///
    /// # Errors
    ///
    /// Returns `Error::Control` if the config carries no broker host.
    pub fn connect(config: &ControlConfig) -> Result<Self> {
        let host = config
            .broker_host
            .as_deref()
            .ok_or_else(|| Error::Control("no broker host configured".to_string()))?;

        let mut options = MqttOptions::new(&config.client_id, host, config.broker_port);
        options.set_keep_alive(Duration::from_secs(30));

        let (client, event_loop) = AsyncClient::new(options, REQUEST_QUEUE);
        let (volume_tx, volume) = watch::channel(1.0f32);

        tokio::spawn(run_event_loop(
            event_loop,
            client.clone(),
            config.clone(),
            volume_tx,
        ));
        tracing::info!(host, port = config.broker_port, "control channel connecting");

        Ok(Self {
            publisher: ControlPublisher {
                client: Some(client),
                openness_topic: config.openness_topic.clone(),
            },
            volume,
        })
    }

    /// Publish handle for the actuator driver
    #[must_use]
    pub fn publisher(&self) -> ControlPublisher {
        self.publisher.clone()
    }

    /// Most recent volume command received on the volume topic
    #[must_use]
    pub fn volume(&self) -> watch::Receiver<f32> {
        self.volume.clone()
    }
}

/// Broker event loop: drives the connection, resubscribes after reconnects,
/// and handles inbound volume commands
async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    config: ControlConfig,
    volume_tx: watch::Sender<f32>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("control channel connected");
                if let Err(e) = client.try_subscribe(&config.volume_topic, QoS::AtMostOnce) {
                    tracing::warn!(error = %e, topic = config.volume_topic, "volume subscribe failed");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish)))
                if publish.topic == config.volume_topic =>
            {
                handle_volume_command(&publish.payload, &client, &config, &volume_tx);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "control channel connection error");
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}

/// Parse, clamp, retain, and forward a volume command
fn handle_volume_command(
    payload: &[u8],
    client: &AsyncClient,
    config: &ControlConfig,
    volume_tx: &watch::Sender<f32>,
) {
    let Ok(text) = std::str::from_utf8(payload) else {
        tracing::warn!("ignoring non-utf8 volume command");
        return;
    };
    let Ok(value) = text.trim().parse::<f32>() else {
        tracing::warn!(payload = text, "ignoring unparseable volume command");
        return;
    };

    let volume = value.clamp(0.0, 1.0);
    volume_tx.send_replace(volume);
    tracing::info!(volume, "volume command received");

    // the device owns its amplifier; forward the clamped value
    if let Err(e) = client.try_publish(
        &config.device_volume_topic,
        QoS::AtMostOnce,
        false,
        format!("{volume:.3}"),
    ) {
        tracing::debug!(error = %e, "volume forward dropped");
    }
}

/// Cheap cloneable handle for publishing actuator values.
///
/// `publish_openness` never blocks and never fails the caller; when the
/// broker queue is full or the channel is disabled the publish is dropped.
#[derive(Clone)]
pub struct ControlPublisher {
    client: Option<AsyncClient>,
    openness_topic: String,
}

impl ControlPublisher {
    /// A publisher that drops everything (control channel disabled)
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            client: None,
            openness_topic: String::new(),
        }
    }

    /// Whether a broker connection backs this publisher
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Publish an openness value as a decimal string, fire-and-forget
    pub fn publish_openness(&self, openness: f32) {
        let Some(client) = &self.client else {
            return;
        };

        if let Err(e) = client.try_publish(
            &self.openness_topic,
            QoS::AtMostOnce,
            false,
            format!("{openness:.3}"),
        ) {
            tracing::debug!(error = %e, "openness publish dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_publisher_is_inert() {
        let publisher = ControlPublisher::disabled();
        assert!(!publisher.is_enabled());
        publisher.publish_openness(0.5);
    }

    #[test]
    fn test_connect_requires_broker_host() {
        let config = ControlConfig::default();
        assert!(config.broker_host.is_none());
        assert!(ControlChannel::connect(&config).is_err());
    }
}
