//! Outbound publishing with system-wide serialization.
//!
//! All four client connections publish through one shared lock so
//! publishes reach the broker in call order and log lines never
//! interleave across tasks. The lock is injected at construction rather
//! than living in a global.

use std::sync::Arc;

use rumqttc::{AsyncClient, QoS};
use tokio::sync::Mutex;
use tracing::{error, info};

use super::link::LinkError;

/// Something a [`Publisher`] can hand a payload to. Implemented by the
/// real rumqttc client and by recording doubles in tests.
pub trait PublishSink {
    async fn publish(&self, topic: &str, retain: bool, payload: Vec<u8>) -> Result<(), LinkError>;
}

impl PublishSink for AsyncClient {
    async fn publish(&self, topic: &str, retain: bool, payload: Vec<u8>) -> Result<(), LinkError> {
        AsyncClient::publish(self, topic, QoS::AtLeastOnce, retain, payload).await?;
        Ok(())
    }
}

/// Retained publisher for one functional channel.
///
/// Failures are logged and swallowed: the bridge favors availability,
/// and broker retention means the next successful publish repairs the
/// observable state.
pub struct Publisher<S> {
    channel: &'static str,
    sink: S,
    lock: Arc<Mutex<()>>,
}

impl<S: PublishSink> Publisher<S> {
    pub fn new(channel: &'static str, sink: S, lock: Arc<Mutex<()>>) -> Self {
        Publisher {
            channel,
            sink,
            lock,
        }
    }

    /// Publishes `payload` retained. The shared lock is held only for
    /// the duration of this one call.
    pub async fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        let payload = payload.into();
        let preview = String::from_utf8_lossy(&payload).into_owned();

        let _serialized = self.lock.lock().await;
        match self.sink.publish(topic, true, payload).await {
            Ok(()) => info!("Send \"{preview}\" to topic \"{topic}\" [{}]", self.channel),
            Err(e) => error!("Failed to send message to topic \"{topic}\": {e}"),
        }
    }
}
