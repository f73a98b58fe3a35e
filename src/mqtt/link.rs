//! Connection lifecycle for one MQTT client.
//!
//! Each functional channel (sensor, device, command, subscription) gets
//! its own [`MqttLink`]: an independent rumqttc client plus event loop.
//! The statum machine separates bring-up (waiting for the broker's
//! CONNACK, where a refusal is fatal) from steady-state driving, where
//! connection errors are logged and rumqttc's internal reconnect takes
//! over on the next poll.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet};
use statum::{machine, state, transition};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::MqttConfig;
use super::message::InboundMessage;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("mqtt connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    #[error("broker refused connection: {0:?}")]
    Refused(ConnectReturnCode),
}

#[state]
#[derive(Debug, Clone)]
pub enum LinkState {
    Connecting,
    Online,
}

#[machine]
pub struct MqttLink<LinkState> {
    channel: &'static str,
    client_id: String,
    client: AsyncClient,
    eventloop: EventLoop,
    /// Set only on the subscription channel; inbound publishes are
    /// forwarded here for the command router.
    inbound: Option<mpsc::Sender<InboundMessage>>,
}

impl MqttLink<Connecting> {
    pub fn create(
        channel: &'static str,
        config: &MqttConfig,
        inbound: Option<mpsc::Sender<InboundMessage>>,
    ) -> Self {
        let client_id = config.client_id(channel);
        debug!("Creating MQTT client {client_id} for {}:{}", config.broker, config.port);

        let mut options = MqttOptions::new(&client_id, &config.broker, config.port);
        options
            .set_credentials(config.user.clone(), config.pass.clone())
            .set_keep_alive(Duration::from_secs(5));

        let (client, eventloop) = AsyncClient::new(options, 100);

        Self::builder()
            .channel(channel)
            .client_id(client_id)
            .client(client)
            .eventloop(eventloop)
            .maybe_inbound(inbound)
            .build()
    }
}

#[transition]
impl MqttLink<Connecting> {
    /// Drives the event loop until the broker acknowledges the
    /// connection. Refusal or transport failure here is fatal.
    pub async fn establish(mut self) -> Result<MqttLink<Online>, LinkError> {
        loop {
            match self.eventloop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    if ack.code == ConnectReturnCode::Success {
                        info!("Connected to MQTT Broker as {}.", self.client_id);
                        break;
                    }
                    error!("Failed to connect as {}: {:?}", self.client_id, ack.code);
                    return Err(LinkError::Refused(ack.code));
                }
                event => trace!("{}: {event:?}", self.channel),
            }
        }
        Ok(self.transition())
    }
}

impl MqttLink<Online> {
    /// Handle for publishing and subscribing on this channel.
    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Moves the event loop into a background task that runs until the
    /// cancellation token fires. Without continuous polling rumqttc
    /// makes no progress, including on outbound publishes.
    pub fn spawn_driver(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("mqtt {} loop stopped", self.channel);
                        break;
                    }
                    event = self.eventloop.poll() => match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.forward(&publish);
                        }
                        Ok(event) => trace!("{}: {event:?}", self.channel),
                        Err(e) => {
                            // rumqttc reconnects on the next poll; back
                            // off so a dead broker does not spin.
                            error!("mqtt {} connection error: {e}", self.channel);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        })
    }

    fn forward(&self, publish: &rumqttc::Publish) {
        let Some(inbound) = &self.inbound else {
            trace!(
                "{}: ignoring publish on {} (no inbound consumer)",
                self.channel,
                publish.topic
            );
            return;
        };
        let message = InboundMessage::from_publish(publish);
        if let Err(e) = inbound.try_send(message) {
            warn!("inbound command queue full, dropping message: {e}");
        }
    }
}
