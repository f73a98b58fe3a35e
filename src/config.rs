//! Bridge configuration.
//!
//! Loaded from `tellbridge/config.toml` under the user configuration
//! directory; a commented default is written on first run so a fresh
//! install has something to edit.

use std::path::PathBuf;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::mqtt::MqttConfig;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct BridgeConfig {
    /// Seconds to wait at startup for telldusd to come up and start
    /// collecting data.
    #[serde(default = "default_grace_secs")]
    pub startup_grace_secs: u64,

    pub mqtt: MqttSettings,
    pub home_assistant: HomeAssistantSettings,

    #[serde(default)]
    pub telldus: TelldusSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HomeAssistantSettings {
    /// Topic prefix for every published and subscribed topic.
    pub state_topic: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TelldusSettings {
    pub client_socket: PathBuf,
    pub event_socket: PathBuf,
}

impl Default for TelldusSettings {
    fn default() -> Self {
        TelldusSettings {
            client_socket: PathBuf::from("/tmp/TelldusClient"),
            event_socket: PathBuf::from("/tmp/TelldusEvents"),
        }
    }
}

fn default_grace_secs() -> u64 {
    5
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            startup_grace_secs: default_grace_secs(),
            mqtt: MqttSettings {
                broker: "localhost".to_owned(),
                port: 1883,
                user: String::new(),
                pass: String::new(),
            },
            home_assistant: HomeAssistantSettings {
                state_topic: "telldus".to_owned(),
            },
            telldus: TelldusSettings::default(),
        }
    }
}

impl BridgeConfig {
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tellbridge")
            .join("config.toml")
    }

    /// Loads the configuration, writing the defaults first if no file
    /// exists yet.
    pub async fn load() -> Result<Self> {
        let path = Self::config_path();

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!("No configuration found, writing defaults to {}", path.display());
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| eyre!("Failed to create config directory: {e}"))?;
            }
            let content = toml::to_string_pretty(&Self::default())
                .map_err(|e| eyre!("Failed to serialize default config: {e}"))?;
            tokio::fs::write(&path, content)
                .await
                .map_err(|e| eyre!("Failed to write default config: {e}"))?;
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {e}", path.display()))?;
        let config =
            toml::from_str(&content).map_err(|e| eyre!("Failed to parse config file: {e}"))?;
        Ok(config)
    }

    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            broker: self.mqtt.broker.clone(),
            port: self.mqtt.port,
            user: self.mqtt.user.clone(),
            pass: self.mqtt.pass.clone(),
        }
    }
}
