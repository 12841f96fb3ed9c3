use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HvacMode {
    #[serde(rename = "AC")]
    Cooling,
    #[serde(rename = "HEAT")]
    Heating,
    #[serde(rename = "OFF")]
    Off,
}

impl HvacMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cooling => "AC",
            Self::Heating => "HEAT",
            Self::Off => "OFF",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "AC" | "COOL" | "COOLING" => Some(Self::Cooling),
            "HEAT" | "HEATING" => Some(Self::Heating),
            "OFF" => Some(Self::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlScheme {
    Manual,
    Basic,
    Auto,
}

impl ControlScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Basic => "BASIC",
            Self::Auto => "AUTO",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MANUAL" => Some(Self::Manual),
            "BASIC" => Some(Self::Basic),
            "AUTO" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActiveDevice {
    Hvac,
    Fan,
}

impl ActiveDevice {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hvac => "HVAC",
            Self::Fan => "FAN",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HVAC" => Some(Self::Hvac),
            "FAN" => Some(Self::Fan),
            _ => None,
        }
    }
}

/// Physical equipment the control loop can switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Equipment {
    Ac,
    Heat,
    Fan,
}

impl Equipment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ac => "ac",
            Self::Heat => "heat",
            Self::Fan => "fan",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    AcOn,
    AcOff,
    HeatOn,
    HeatOff,
    FanOn,
    FanOff,
}

impl EngineAction {
    pub fn switch(equipment: Equipment, on: bool) -> Self {
        match (equipment, on) {
            (Equipment::Ac, true) => Self::AcOn,
            (Equipment::Ac, false) => Self::AcOff,
            (Equipment::Heat, true) => Self::HeatOn,
            (Equipment::Heat, false) => Self::HeatOff,
            (Equipment::Fan, true) => Self::FanOn,
            (Equipment::Fan, false) => Self::FanOff,
        }
    }

    pub fn equipment(self) -> Equipment {
        match self {
            Self::AcOn | Self::AcOff => Equipment::Ac,
            Self::HeatOn | Self::HeatOff => Equipment::Heat,
            Self::FanOn | Self::FanOff => Equipment::Fan,
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, Self::AcOn | Self::HeatOn | Self::FanOn)
    }

    pub fn payload(self) -> &'static str {
        if self.is_on() {
            "ON"
        } else {
            "OFF"
        }
    }
}

/// Aggregate view published to observers. Rebuilt from scratch every tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemSnapshot {
    pub timestamp: String,
    pub mode: &'static str,
    pub control: &'static str,
    pub ac_status: bool,
    pub heat_status: bool,
    pub fan_status: bool,
    #[serde(flatten)]
    pub devices: BTreeMap<String, bool>,
    pub current_temp: Option<f32>,
    pub set_temp: f32,
    pub target_temp: Option<f32>,
    pub outside_temp: Option<f32>,
    pub inside_dewp: Option<f32>,
    pub outside_dewp: Option<f32>,
    pub hvac_temp: Option<f32>,
    pub hvac_mode: Option<&'static str>,
    pub active_therm: String,
    pub zone_temps: BTreeMap<String, f32>,
    pub phase_times: Vec<String>,
    pub phase_sets: Vec<f32>,
    pub active_phases: Vec<bool>,
    pub current_phase: Option<usize>,
    pub next_phase_change: Option<i64>,
    pub drying_end: Option<String>,
    pub drying_status: bool,
    pub pause_end: Option<String>,
    pub pause_mode: bool,
    pub alert: bool,
    pub last_hvac_event: Option<String>,
    pub last_equipment_event: Option<String>,
    pub mode_change_avail: bool,
    pub mode_change_block: Option<&'static str>,
    pub active_device: &'static str,
    pub last_rejection: Option<String>,
}

pub fn epoch_ms(now: DateTime<FixedOffset>) -> u64 {
    u64::try_from(now.timestamp_millis()).unwrap_or(0)
}

pub fn epoch_ms_to_rfc3339(ms: u64) -> Option<String> {
    let ms = i64::try_from(ms).ok()?;
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms).map(|dt| dt.to_rfc3339())
}
