use crate::{readings::Reading, types::Equipment};

pub const TOPIC_HEARTBEAT_PREFIX: &str = "hvac/heartbeat/";
pub const TOPIC_HEARTBEAT_FILTER: &str = "hvac/heartbeat/+";

pub const TOPIC_SENSOR_PREFIX: &str = "hvac/sensor/";
pub const TOPIC_SENSOR_FILTER: &str = "hvac/sensor/#";
pub const TOPIC_SENSOR_INDOOR_TEMP: &str = "hvac/sensor/indoor/temperature";
pub const TOPIC_SENSOR_INDOOR_DEWP: &str = "hvac/sensor/indoor/dewpoint";
pub const TOPIC_SENSOR_OUTDOOR_TEMP: &str = "hvac/sensor/outdoor/temperature";
pub const TOPIC_SENSOR_OUTDOOR_DEWP: &str = "hvac/sensor/outdoor/dewpoint";
pub const TOPIC_SENSOR_RETURN_TEMP: &str = "hvac/sensor/return/temperature";

pub const TOPIC_CMD: &str = "hvac/cmnd";

pub const TOPIC_CONTROLLER_STATE: &str = "hvac/controller/state";
pub const TOPIC_CONTROLLER_SCHEDULE_STATE: &str = "hvac/controller/schedule/state";

pub const TOPIC_ACTUATE_PREFIX: &str = "hvac/actuate/";

pub fn heartbeat_topic(device_id: &str) -> String {
    format!("{TOPIC_HEARTBEAT_PREFIX}{device_id}")
}

pub fn zone_temp_topic(zone: &str) -> String {
    format!("{TOPIC_SENSOR_PREFIX}zone/{zone}/temperature")
}

pub fn actuate_topic(equipment: Equipment) -> String {
    format!("{TOPIC_ACTUATE_PREFIX}{}", equipment.as_str())
}

/// Device id from `hvac/heartbeat/<id>`.
pub fn parse_heartbeat_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TOPIC_HEARTBEAT_PREFIX)
        .filter(|id| !id.is_empty() && !id.contains('/'))
}

/// Decodes a sensor publish into a reading. Payloads are plain decimal
/// numbers; anything else is ignored.
pub fn parse_reading(topic: &str, payload: &str) -> Option<Reading> {
    let value = payload.trim().parse::<f32>().ok()?;

    let reading = match topic {
        TOPIC_SENSOR_INDOOR_TEMP => Reading::IndoorTemp(value),
        TOPIC_SENSOR_INDOOR_DEWP => Reading::InsideDewPoint(value),
        TOPIC_SENSOR_OUTDOOR_TEMP => Reading::OutsideTemp(value),
        TOPIC_SENSOR_OUTDOOR_DEWP => Reading::OutsideDewPoint(value),
        TOPIC_SENSOR_RETURN_TEMP => Reading::HvacTemp(value),
        _ => {
            let zone = topic
                .strip_prefix(TOPIC_SENSOR_PREFIX)?
                .strip_prefix("zone/")?
                .strip_suffix("/temperature")?;
            if zone.is_empty() || zone.contains('/') {
                return None;
            }
            Reading::ZoneTemp {
                zone: zone.to_string(),
                temp: value,
            }
        }
    };

    Some(reading)
}
