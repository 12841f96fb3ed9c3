use serde::{Deserialize, Serialize};

use crate::{
    heartbeat::DeviceKind,
    types::{ActiveDevice, ControlScheme, HvacMode},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HvacConfig {
    pub tick_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_staleness_multiplier: u32,
    pub sensor_stale_timeout_ms: u64,
    pub state_publish_interval_ms: u64,
    pub basic_threshold_range: f32,
    pub auto_threshold_range: f32,
    pub max_dewp: f32,
    pub critical_hvac_temp: f32,
    pub critical_hvac_heat_diff: f32,
    pub mode_change_time_delta_ms: u64,
    pub hvac_event_mode_change_lag_ms: u64,
    pub min_set_temp: f32,
    pub max_set_temp: f32,
    pub max_override_minutes: u32,
    pub min_valid_temp_f: f32,
    pub max_valid_temp_f: f32,
}

impl Default for HvacConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            heartbeat_interval_ms: 5_000,
            heartbeat_staleness_multiplier: 3,
            sensor_stale_timeout_ms: 300_000,
            state_publish_interval_ms: 5_000,
            basic_threshold_range: 1.0,
            auto_threshold_range: 1.5,
            max_dewp: 60.0,
            critical_hvac_temp: 45.0,
            critical_hvac_heat_diff: 40.0,
            mode_change_time_delta_ms: 900_000,
            hvac_event_mode_change_lag_ms: 300_000,
            min_set_temp: 40.0,
            max_set_temp: 90.0,
            max_override_minutes: 720,
            min_valid_temp_f: -40.0,
            max_valid_temp_f: 150.0,
        }
    }
}

impl HvacConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(10, 10_000);
        self.heartbeat_interval_ms = self.heartbeat_interval_ms.max(100);
        // One missed beat must not flap a device to dead.
        self.heartbeat_staleness_multiplier = self.heartbeat_staleness_multiplier.max(2);
        self.state_publish_interval_ms = self.state_publish_interval_ms.max(100);
        self.basic_threshold_range = self.basic_threshold_range.clamp(0.1, 10.0);
        self.auto_threshold_range = self.auto_threshold_range.clamp(0.1, 10.0);
        if self.min_set_temp > self.max_set_temp {
            std::mem::swap(&mut self.min_set_temp, &mut self.max_set_temp);
        }
        self.max_override_minutes = self.max_override_minutes.max(1);
    }

    pub fn staleness_threshold_ms(&self) -> u64 {
        self.heartbeat_interval_ms
            .saturating_mul(u64::from(self.heartbeat_staleness_multiplier.max(2)))
    }

    pub fn set_temp_range(&self) -> std::ops::RangeInclusive<f32> {
        self.min_set_temp..=self.max_set_temp
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistedSettings {
    pub set_temp_f: f32,
    pub control: ControlScheme,
    pub mode: HvacMode,
    pub active_therm: String,
    pub active_device: ActiveDevice,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            set_temp_f: 72.0,
            control: ControlScheme::Basic,
            mode: HvacMode::Off,
            active_therm: "zone1".to_string(),
            active_device: ActiveDevice::Hvac,
        }
    }
}

impl PersistedSettings {
    pub fn sanitize(&mut self, config: &HvacConfig) {
        if !self.set_temp_f.is_finite() {
            self.set_temp_f = PersistedSettings::default().set_temp_f;
        }
        self.set_temp_f = self
            .set_temp_f
            .clamp(config.min_set_temp, config.max_set_temp);
    }
}

/// One entry of the fixed device registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSpec {
    pub id: String,
    pub kind: DeviceKind,
    /// Prefix used for `<key>_heartbeat` / `<key>_ability` snapshot fields.
    pub key: String,
}

impl DeviceSpec {
    pub fn new(id: &str, kind: DeviceKind, key: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            key: key.to_string(),
        }
    }
}

pub fn default_devices() -> Vec<DeviceSpec> {
    vec![
        DeviceSpec::new("thermostat", DeviceKind::Thermostat, "hvac"),
        DeviceSpec::new("fan", DeviceKind::Fan, "fan"),
        DeviceSpec::new("zone1", DeviceKind::ZoneSensor, "zone1"),
        DeviceSpec::new("zone2", DeviceKind::ZoneSensor, "zone2"),
        DeviceSpec::new("outdoor", DeviceKind::OutdoorSensor, "outdoor"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub hvac: HvacConfig,
    #[serde(default)]
    pub settings: PersistedSettings,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceSpec>,
}

fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            hvac: HvacConfig::default(),
            settings: PersistedSettings::default(),
            timezone: default_timezone(),
            network: NetworkConfig::default(),
            devices: default_devices(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.hvac.sanitize();
        self.settings.sanitize(&self.hvac);
        if self.devices.is_empty() {
            self.devices = default_devices();
        }
        let mut seen = std::collections::BTreeSet::new();
        self.devices.retain(|device| seen.insert(device.id.clone()));
    }
}
