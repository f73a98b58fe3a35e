pub mod bridge;
pub mod config;
pub mod hass;
pub mod mqtt;
pub mod telldus;

use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use rumqttc::QoS;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::bridge::{run_router, DeviceTranslator, RawTranslator, SensorTranslator};
use crate::config::BridgeConfig;
use crate::hass::Announced;
use crate::mqtt::{MqttLink, Publisher};
use crate::telldus::TelldusClient;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = BridgeConfig::load().await?;

    // telldusd populates its device list asynchronously after boot, so
    // an enumeration done too early comes back empty.
    info!("Waiting for telldus-core to start");
    tokio::time::sleep(Duration::from_secs(config.startup_grace_secs)).await;
    info!("telldus-core should have started");

    let mqtt_config = config.mqtt_config();
    let prefix = config.home_assistant.state_topic.clone();
    let cancel = CancellationToken::new();
    let publish_lock = Arc::new(Mutex::new(()));

    // Four broker connections, one per functional channel. Only the
    // subscription channel consumes inbound publishes.
    let (inbound_tx, inbound_rx) = mpsc::channel(100);
    let sensor_link = MqttLink::create("sensor", &mqtt_config, None)
        .establish()
        .await
        .wrap_err("sensor channel failed to connect")?;
    let device_link = MqttLink::create("device", &mqtt_config, None)
        .establish()
        .await
        .wrap_err("device channel failed to connect")?;
    let command_link = MqttLink::create("command", &mqtt_config, None)
        .establish()
        .await
        .wrap_err("command channel failed to connect")?;
    let subscription_link = MqttLink::create("subscription", &mqtt_config, Some(inbound_tx))
        .establish()
        .await
        .wrap_err("subscription channel failed to connect")?;

    let sensor_client = sensor_link.client();
    let device_client = device_link.client();
    let command_client = command_link.client();
    let subscription_client = subscription_link.client();

    let _drivers = [
        sensor_link.spawn_driver(cancel.clone()),
        device_link.spawn_driver(cancel.clone()),
        command_link.spawn_driver(cancel.clone()),
        subscription_link.spawn_driver(cancel.clone()),
    ];

    let sensor_publisher = Publisher::new("sensor", sensor_client.clone(), publish_lock.clone());
    let device_publisher = Publisher::new("device", device_client.clone(), publish_lock.clone());
    let command_publisher = Publisher::new("command", command_client.clone(), publish_lock.clone());

    let telldus = TelldusClient::new(&config.telldus.client_socket);

    // Initial sweep so retained broker state reflects reality before
    // any live event arrives.
    let mut sensor_announced = Announced::default();
    let known_sensors =
        bridge::publish_initial_sensors(&telldus, &sensor_publisher, &prefix, &mut sensor_announced)
            .await
            .wrap_err("initial sensor publish failed")?;
    let mut device_announced = Announced::default();
    let devices =
        bridge::publish_initial_devices(&telldus, &device_publisher, &prefix, &mut device_announced)
            .await
            .wrap_err("initial device publish failed")?;

    let events = telldus::events::listen(&config.telldus.event_socket, cancel.clone())
        .await
        .wrap_err("cannot listen for telldus events")?;

    let command_filter = format!("{prefix}/+/+/set");
    subscription_client
        .subscribe(&command_filter, QoS::AtLeastOnce)
        .await
        .wrap_err("command subscription failed")?;
    info!("Subscribed to {command_filter}");

    let _sensor_task = tokio::spawn(
        SensorTranslator::new(
            sensor_publisher,
            telldus.clone(),
            prefix.clone(),
            known_sensors,
            sensor_announced,
        )
        .run(events.sensor),
    );
    let _device_task = tokio::spawn(
        DeviceTranslator::new(
            device_publisher,
            telldus.clone(),
            prefix.clone(),
            devices,
            device_announced,
        )
        .run(events.device),
    );
    let _raw_task = tokio::spawn(RawTranslator::new(command_publisher, prefix.clone()).run(events.raw));
    let _router_task = tokio::spawn(run_router(inbound_rx, telldus.clone()));

    info!("Bridge running, press ctrl-c to stop");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.wrap_err("failed to listen for interrupt")?;
            info!("Interrupt received, shutting down");
        }
        // The event reader cancels the token when the telldusd socket
        // dies; exit so a supervisor can restart the bridge.
        _ = cancel.cancelled() => {
            warn!("Telldus event stream lost, shutting down");
        }
    }
    if let Err(e) = subscription_client.unsubscribe(&command_filter).await {
        warn!("Unsubscribe failed: {e}");
    }
    for client in [
        &sensor_client,
        &device_client,
        &command_client,
        &subscription_client,
    ] {
        if let Err(e) = client.disconnect().await {
            warn!("Disconnect failed: {e}");
        }
    }
    cancel.cancel();

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
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
