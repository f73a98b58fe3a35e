//! Inbound command routing.
//!
//! Home Assistant publishes commands on `<prefix>/<device>/<capability>/set`
//! (and `<prefix>/<device>/light/dim` for direct dim levels). The router
//! parses each message into a device command and sends it to the
//! controller. Anything malformed or unsupported is logged and dropped;
//! the router never stops for a bad message.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::mqtt::InboundMessage;
use crate::telldus::{DeviceCommands, Method};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("topic does not have four segments: \"{0}\"")]
    BadTopic(String),

    #[error("device id is not numeric: \"{0}\"")]
    BadDeviceId(String),

    #[error("payload is not an integer: \"{0}\"")]
    BadPayload(String),

    #[error("command \"{capability}/{action}\" not supported")]
    Unsupported { capability: String, action: String },

    #[error("switch payload {0} matches no method code")]
    UnsupportedSwitchPayload(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TurnOn { device: i32 },
    TurnOff { device: i32 },
    TurnOnOnce { device: i32 },
    Dim { device: i32, level: i32 },
}

/// Maps a command topic and integer payload to a device command.
pub fn parse_command(topic: &str, payload: &str) -> Result<Command, CommandError> {
    let segments: Vec<&str> = topic.split('/').collect();
    let [_prefix, device, capability, action] = segments[..] else {
        return Err(CommandError::BadTopic(topic.to_owned()));
    };
    let device: i32 = device
        .parse()
        .map_err(|_| CommandError::BadDeviceId(device.to_owned()))?;
    let value: i32 = payload
        .trim()
        .parse()
        .map_err(|_| CommandError::BadPayload(payload.to_owned()))?;

    match (capability, action) {
        ("light", "dim") => Ok(Command::Dim {
            device,
            level: value,
        }),
        ("light", "set") if value == 0 => Ok(Command::TurnOff { device }),
        ("light", "set") => Ok(Command::TurnOnOnce { device }),
        ("brightness", "set") => Ok(Command::Dim {
            device,
            level: value,
        }),
        ("switch", "set") if value == Method::TurnOn.code() => Ok(Command::TurnOn { device }),
        ("switch", "set") if value == Method::TurnOff.code() => Ok(Command::TurnOff { device }),
        ("switch", "set") => Err(CommandError::UnsupportedSwitchPayload(value)),
        _ => Err(CommandError::Unsupported {
            capability: capability.to_owned(),
            action: action.to_owned(),
        }),
    }
}

/// Consumes the inbound message queue until it closes.
pub async fn run_router<C: DeviceCommands>(
    mut messages: mpsc::Receiver<InboundMessage>,
    controller: C,
) {
    info!("Command router started");
    while let Some(message) = messages.recv().await {
        handle_message(&controller, &message).await;
    }
    debug!("inbound queue closed, command router stopping");
}

async fn handle_message<C: DeviceCommands>(controller: &C, message: &InboundMessage) {
    info!(
        "Received \"{}\" from \"{}\" topic",
        message.payload, message.topic
    );

    let command = match parse_command(&message.topic, &message.payload) {
        Ok(command) => command,
        Err(e) => {
            error!("[DEVICE] Dropping command: {e}");
            return;
        }
    };

    let result = match command {
        Command::TurnOn { device } => {
            info!("[DEVICE] Sending command ON to device id \"{device}\"");
            controller.turn_on(device).await
        }
        Command::TurnOff { device } => {
            info!("[DEVICE] Sending command OFF to device id \"{device}\"");
            controller.turn_off(device).await
        }
        Command::TurnOnOnce { device } => {
            info!("[DEVICE] Sending light ON ONCE to device id \"{device}\"");
            controller.turn_on_once(device).await
        }
        Command::Dim { device, level } => {
            info!("[DEVICE] Sending command DIM \"{level}\" to device id \"{device}\"");
            controller.dim(device, level).await
        }
    };

    // Send failures are logged, never retried or escalated.
    if let Err(e) = result {
        error!("[DEVICE] Command failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telldus::client::testing::{Call, RecordingController};

    async fn route(topic: &str, payload: &str) -> Vec<Call> {
        let controller = RecordingController::default();
        handle_message(&controller, &InboundMessage::new(topic, payload)).await;
        controller.calls()
    }

    #[tokio::test]
    async fn switch_turn_on_code_triggers_exactly_one_turn_on() {
        assert_eq!(route("telldus/5/switch/set", "1").await, vec![Call::TurnOn(5)]);
    }

    #[tokio::test]
    async fn switch_turn_off_code() {
        assert_eq!(route("telldus/5/switch/set", "2").await, vec![Call::TurnOff(5)]);
    }

    #[tokio::test]
    async fn light_zero_turns_off() {
        assert_eq!(route("telldus/5/light/set", "0").await, vec![Call::TurnOff(5)]);
    }

    #[tokio::test]
    async fn light_nonzero_turns_on_once() {
        assert_eq!(
            route("telldus/5/light/set", "7").await,
            vec![Call::TurnOnOnce(5)]
        );
    }

    #[tokio::test]
    async fn brightness_dims() {
        assert_eq!(
            route("telldus/5/brightness/set", "128").await,
            vec![Call::Dim(5, 128)]
        );
    }

    #[tokio::test]
    async fn light_dim_action_dims() {
        assert_eq!(
            route("telldus/5/light/dim", "200").await,
            vec![Call::Dim(5, 200)]
        );
    }

    #[tokio::test]
    async fn malformed_topics_produce_no_calls() {
        assert!(route("telldus/5/switch", "1").await.is_empty());
        assert!(route("telldus/5/switch/set/extra", "1").await.is_empty());
        assert!(route("telldus/notanumber/switch/set", "1").await.is_empty());
        assert!(route("telldus/5/switch/get", "1").await.is_empty());
    }

    #[tokio::test]
    async fn non_integer_payload_produces_no_calls() {
        assert!(route("telldus/5/switch/set", "on").await.is_empty());
        assert!(route("telldus/5/brightness/set", "").await.is_empty());
    }

    #[tokio::test]
    async fn unknown_capability_or_switch_payload_is_dropped() {
        assert!(route("telldus/5/cover/set", "1").await.is_empty());
        assert!(route("telldus/5/switch/set", "5").await.is_empty());
    }

    #[tokio::test]
    async fn controller_failure_is_swallowed() {
        let controller = RecordingController {
            fail_status: Some(-1),
            ..Default::default()
        };
        handle_message(&controller, &InboundMessage::new("telldus/5/switch/set", "1")).await;
        assert_eq!(controller.calls(), vec![Call::TurnOn(5)]);
    }

    #[test]
    fn payload_whitespace_is_tolerated() {
        assert_eq!(
            parse_command("telldus/5/brightness/set", "128\n").unwrap(),
            Command::Dim {
                device: 5,
                level: 128
            }
        );
    }
}
