use rand::Rng;

/// Broker settings shared by all four client connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl MqttConfig {
    /// Client id for one functional channel, with a random suffix so
    /// restarts never collide with a broker-side stale session.
    pub fn client_id(&self, channel: &str) -> String {
        let suffix: u16 = rand::thread_rng().gen_range(0..1000);
        format!("tellbridge-{channel}-{suffix}")
    }
}
