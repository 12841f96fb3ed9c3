use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::DeviceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Thermostat,
    Fan,
    ZoneSensor,
    OutdoorSensor,
    ExternalAc,
}

#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
    pub kind: DeviceKind,
    pub key: String,
    last_seen_ms: Option<u64>,
    alive: bool,
    ability: bool,
}

impl Device {
    fn from_spec(spec: &DeviceSpec) -> Self {
        Self {
            id: spec.id.clone(),
            kind: spec.kind,
            key: spec.key.clone(),
            last_seen_ms: None,
            alive: false,
            ability: true,
        }
    }

    pub fn last_seen_ms(&self) -> Option<u64> {
        self.last_seen_ms
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Effective ability: a dead device never reports itself as enabled.
    pub fn ability(&self) -> bool {
        self.alive && self.ability
    }

    pub fn ability_preference(&self) -> bool {
        self.ability
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessChange {
    pub device_id: String,
    pub liveness: Liveness,
}

/// Tracks per-device liveness from periodic heartbeats.
///
/// `alive` only flips to `false` inside [`HeartbeatMonitor::sweep`], and only
/// flips back to `true` when a heartbeat is recorded that is fresh relative to
/// the latest sweep, so a late-delivered old beat cannot revive a dead device.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    devices: BTreeMap<String, Device>,
    staleness_threshold_ms: u64,
    swept_ms: u64,
}

impl HeartbeatMonitor {
    pub fn new(registry: &[DeviceSpec], staleness_threshold_ms: u64) -> Self {
        let devices = registry
            .iter()
            .map(|spec| (spec.id.clone(), Device::from_spec(spec)))
            .collect();
        Self {
            devices,
            staleness_threshold_ms,
            swept_ms: 0,
        }
    }

    pub fn staleness_threshold_ms(&self) -> u64 {
        self.staleness_threshold_ms
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn device_by_key(&self, key: &str) -> Option<&Device> {
        self.devices.values().find(|device| device.key == key)
    }

    pub fn first_of_kind(&self, kind: DeviceKind) -> Option<&Device> {
        self.devices.values().find(|device| device.kind == kind)
    }

    /// Last-writer-wins on `last_seen`; a stale timestamp never moves it back.
    pub fn record_heartbeat(&mut self, device_id: &str, now_ms: u64) -> Option<LivenessChange> {
        let Some(device) = self.devices.get_mut(device_id) else {
            warn!("heartbeat from unknown device {device_id:?} ignored");
            return None;
        };

        let last = device.last_seen_ms.map_or(now_ms, |last| last.max(now_ms));
        device.last_seen_ms = Some(last);

        if device.alive {
            return None;
        }
        if self.swept_ms.saturating_sub(last) >= self.staleness_threshold_ms {
            debug!("stale heartbeat from {device_id} at {now_ms}ms, still dead");
            return None;
        }

        device.alive = true;
        info!("device {device_id} is alive");
        Some(LivenessChange {
            device_id: device_id.to_string(),
            liveness: Liveness::Alive,
        })
    }

    pub fn is_alive(&self, device_id: &str, now_ms: u64) -> bool {
        self.devices
            .get(device_id)
            .and_then(|device| device.last_seen_ms)
            .map(|last| now_ms.saturating_sub(last) < self.staleness_threshold_ms)
            .unwrap_or(false)
    }

    pub fn sweep(&mut self, now_ms: u64) -> Vec<LivenessChange> {
        let threshold = self.staleness_threshold_ms;
        self.swept_ms = self.swept_ms.max(now_ms);
        let mut changes = Vec::new();

        for device in self.devices.values_mut() {
            if !device.alive {
                continue;
            }
            let fresh = device
                .last_seen_ms
                .map(|last| now_ms.saturating_sub(last) < threshold)
                .unwrap_or(false);
            if fresh {
                continue;
            }

            device.alive = false;
            warn!(
                "device {} missed heartbeats for {}ms, marking dead",
                device.id, threshold
            );
            changes.push(LivenessChange {
                device_id: device.id.clone(),
                liveness: Liveness::Dead,
            });
        }

        changes
    }

    /// Sets the operator preference for the device registered under `key`.
    pub fn set_ability(&mut self, key: &str, ability: bool) -> bool {
        let Some(device) = self.devices.values_mut().find(|device| device.key == key) else {
            return false;
        };
        if device.ability != ability {
            debug!("device {} ability -> {ability}", device.id);
        }
        device.ability = ability;
        true
    }

    pub fn ability(&self, key: &str) -> bool {
        self.device_by_key(key)
            .map(Device::ability)
            .unwrap_or(false)
    }

    pub fn is_available(&self, key: &str) -> bool {
        self.ability(key)
    }
}
