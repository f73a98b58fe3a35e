use std::fmt;

use chrono::NaiveDateTime;
use rumqttc::Publish;

/// An inbound MQTT message as handed to the command router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
    pub received: NaiveDateTime,
}

impl InboundMessage {
    pub fn from_publish(publish: &Publish) -> Self {
        InboundMessage {
            topic: publish.topic.clone(),
            payload: String::from_utf8_lossy(&publish.payload).into_owned(),
            received: chrono::Local::now().naive_local(),
        }
    }

    #[cfg(test)]
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
            received: chrono::Local::now().naive_local(),
        }
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} - {}: {}", self.received, self.topic, self.payload)
    }
}
