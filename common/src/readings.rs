use std::collections::BTreeMap;

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// Temperature at the thermostat itself.
    IndoorTemp(f32),
    ZoneTemp { zone: String, temp: f32 },
    OutsideTemp(f32),
    InsideDewPoint(f32),
    OutsideDewPoint(f32),
    /// Return-air temperature measured at the air handler.
    HvacTemp(f32),
}

impl Reading {
    fn value(&self) -> f32 {
        match self {
            Self::IndoorTemp(v)
            | Self::OutsideTemp(v)
            | Self::InsideDewPoint(v)
            | Self::OutsideDewPoint(v)
            | Self::HvacTemp(v) => *v,
            Self::ZoneTemp { temp, .. } => *temp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f32,
    pub at_ms: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Readings {
    pub indoor_temp: Option<Sample>,
    pub zone_temps: BTreeMap<String, Sample>,
    pub outside_temp: Option<Sample>,
    pub inside_dewp: Option<Sample>,
    pub outside_dewp: Option<Sample>,
    pub hvac_temp: Option<Sample>,
    valid_range: Option<(f32, f32)>,
    stale_after_ms: u64,
}

impl Readings {
    pub fn new(min_valid: f32, max_valid: f32, stale_after_ms: u64) -> Self {
        Self {
            valid_range: Some((min_valid, max_valid)),
            stale_after_ms,
            ..Self::default()
        }
    }

    /// Stores a reading, last-writer-wins. Implausible values are dropped.
    pub fn record(&mut self, reading: Reading, now_ms: u64) -> bool {
        let value = reading.value();
        let plausible = value.is_finite()
            && self
                .valid_range
                .map(|(min, max)| (min..=max).contains(&value))
                .unwrap_or(true);
        if !plausible {
            warn!("dropping implausible reading {reading:?}");
            return false;
        }

        let sample = Sample {
            value,
            at_ms: now_ms,
        };
        match reading {
            Reading::IndoorTemp(_) => self.indoor_temp = Some(sample),
            Reading::ZoneTemp { zone, .. } => {
                self.zone_temps.insert(zone, sample);
            }
            Reading::OutsideTemp(_) => self.outside_temp = Some(sample),
            Reading::InsideDewPoint(_) => self.inside_dewp = Some(sample),
            Reading::OutsideDewPoint(_) => self.outside_dewp = Some(sample),
            Reading::HvacTemp(_) => self.hvac_temp = Some(sample),
        }
        true
    }

    pub fn fresh(&self, sample: Option<Sample>, now_ms: u64) -> Option<f32> {
        sample
            .filter(|s| now_ms.saturating_sub(s.at_ms) < self.stale_after_ms)
            .map(|s| s.value)
    }

    pub fn zone(&self, zone: &str, now_ms: u64) -> Option<f32> {
        self.fresh(self.zone_temps.get(zone).copied(), now_ms)
    }
}
