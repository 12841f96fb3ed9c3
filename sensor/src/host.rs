use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use tracing::{debug, info, warn};

use hvac_common::{
    config::default_devices, heartbeat_topic, zone_temp_topic, DeviceKind, HvacConfig,
    TOPIC_SENSOR_INDOOR_DEWP, TOPIC_SENSOR_INDOOR_TEMP, TOPIC_SENSOR_OUTDOOR_DEWP,
    TOPIC_SENSOR_OUTDOOR_TEMP, TOPIC_SENSOR_RETURN_TEMP,
};

const READING_PERIOD: Duration = Duration::from_secs(30);

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);

    let mut mqtt_options = MqttOptions::new("hvac-sensor-fleet", mqtt_host, mqtt_port);

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let devices = fleet_from_env(std::env::var("HVAC_DEVICES").ok().as_deref());
    let zones: Vec<&str> = devices
        .iter()
        .map(String::as_str)
        .filter(|id| id.starts_with("zone"))
        .collect();

    let heartbeat_period = Duration::from_millis(HvacConfig::default().heartbeat_interval_ms);

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 64);

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!("simulating {} devices: {}", devices.len(), devices.join(", "));

    let mut tick: u64 = 0;
    let mut heartbeats = tokio::time::interval(heartbeat_period);
    let mut readings = tokio::time::interval(READING_PERIOD);

    loop {
        tokio::select! {
            _ = heartbeats.tick() => {
                for device_id in &devices {
                    mqtt.publish(heartbeat_topic(device_id), QoS::AtMostOnce, false, "alive")
                        .await
                        .with_context(|| format!("failed to publish heartbeat for {device_id}"))?;
                }
                debug!("heartbeats sent");
            }
            _ = readings.tick() => {
                tick = tick.saturating_add(1);
                for (topic, value) in simulated_readings(tick, &zones) {
                    mqtt.publish(topic.as_str(), QoS::AtLeastOnce, true, format!("{value:.1}"))
                        .await
                        .with_context(|| format!("failed to publish {topic}"))?;
                }
            }
        }
    }
}

/// Device ids to impersonate: a comma separated list, or the default registry.
fn fleet_from_env(raw: Option<&str>) -> Vec<String> {
    let listed: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    if !listed.is_empty() {
        return listed;
    }
    default_devices()
        .into_iter()
        .filter(|device| device.kind != DeviceKind::ExternalAc)
        .map(|device| device.id)
        .collect()
}

// Slow sawtooth drift so the controller sees both sides of its deadband.
fn simulated_readings(tick: u64, zones: &[&str]) -> Vec<(String, f32)> {
    let drift = (tick % 12) as f32 * 0.25;

    let mut readings = vec![
        (TOPIC_SENSOR_INDOOR_TEMP.to_string(), 70.0 + drift),
        (TOPIC_SENSOR_INDOOR_DEWP.to_string(), 50.0 + drift * 0.5),
        (TOPIC_SENSOR_OUTDOOR_TEMP.to_string(), 82.0 - drift),
        (TOPIC_SENSOR_OUTDOOR_DEWP.to_string(), 58.0),
        (TOPIC_SENSOR_RETURN_TEMP.to_string(), 68.0 + drift),
    ];
    for (offset, zone) in zones.iter().enumerate() {
        readings.push((zone_temp_topic(zone), 69.0 + offset as f32 + drift));
    }
    readings
}
