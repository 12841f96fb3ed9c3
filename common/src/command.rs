use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::CommandError,
    overrides::OverrideKind,
    schedule::parse_phase_time,
    types::{ActiveDevice, ControlScheme, EngineAction, Equipment, HvacMode},
};

/// Wire form of a command: `{"command": "MODE", "data": "AC"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub data: Value,
}

impl CommandRequest {
    pub fn new(command: &str, data: impl Into<Value>) -> Self {
        Self {
            command: command.to_string(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ability { key: &'static str, on: bool },
    Mode(HvacMode),
    Control(ControlScheme),
    SetTemp(f32),
    ChangeTherm(String),
    UpdatePhaseTime { index: usize, start_minutes: u16 },
    UpdatePhaseTemp { index: usize, target_temp_f: f32 },
    StartPhases(Vec<usize>),
    CancelPhases(Vec<usize>),
    StartOverride { kind: OverrideKind, duration_ms: i64 },
    ClearOverride(OverrideKind),
    ModeCheck,
    AutoModeChange,
    Device(ActiveDevice),
    Direct(EngineAction),
    Manual { equipment: Equipment, on: bool },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ability { key: "fan", .. } => "FAN ABILITY",
            Self::Ability { .. } => "HVAC ABILITY",
            Self::Mode(_) => "MODE",
            Self::Control(_) => "CONTROL",
            Self::SetTemp(_) => "SET",
            Self::ChangeTherm(_) => "CHANGE THERM",
            Self::UpdatePhaseTime { .. } => "UPDATE PHASE TIME",
            Self::UpdatePhaseTemp { .. } => "UPDATE PHASE TEMP",
            Self::StartPhases(_) => "START PHASES",
            Self::CancelPhases(_) => "CANCEL PHASES",
            Self::StartOverride {
                kind: OverrideKind::Drying,
                ..
            } => "DRY",
            Self::StartOverride { .. } => "PAUSE START",
            Self::ClearOverride(OverrideKind::Drying) => "DRY CLEAR",
            Self::ClearOverride(OverrideKind::Pause) => "PAUSE CLEAR",
            Self::ModeCheck => "HVAC MODE CHECK",
            Self::AutoModeChange => "AUTO MODE CHANGE",
            Self::Device(_) => "DEVICE",
            Self::Direct(_) => "DIRECT",
            Self::Manual {
                equipment: Equipment::Fan,
                ..
            } => "MANUAL FAN",
            Self::Manual { .. } => "MANUAL AC",
        }
    }

    pub fn parse(request: &CommandRequest) -> Result<Self, CommandError> {
        let name = request.command.trim().to_ascii_uppercase();
        let data = &request.data;

        let command = match name.as_str() {
            "HVAC ABILITY" => Self::Ability {
                key: "hvac",
                on: on_off("HVAC ABILITY", data)?,
            },
            "FAN ABILITY" => Self::Ability {
                key: "fan",
                on: on_off("FAN ABILITY", data)?,
            },
            "MODE" => {
                let raw = text("MODE", data)?;
                Self::Mode(
                    HvacMode::parse(raw)
                        .ok_or_else(|| CommandError::malformed("MODE", format!("{raw:?}")))?,
                )
            }
            "CONTROL" => {
                let raw = text("CONTROL", data)?;
                Self::Control(
                    ControlScheme::parse(raw)
                        .ok_or_else(|| CommandError::malformed("CONTROL", format!("{raw:?}")))?,
                )
            }
            "SET" | "SET_TEMPERATURE" => Self::SetTemp(number("SET", data)? as f32),
            "CHANGE THERM" => {
                let zone = match data {
                    Value::Number(n) => format!("zone{n}"),
                    _ => text("CHANGE THERM", data)?.trim().to_string(),
                };
                if zone.is_empty() {
                    return Err(CommandError::malformed("CHANGE THERM", "empty zone id"));
                }
                Self::ChangeTherm(zone)
            }
            "UPDATE PHASE TIME" => {
                let (index, value) = indexed("UPDATE PHASE TIME", data)?;
                let raw = text("UPDATE PHASE TIME", value)?;
                let start_minutes = parse_phase_time(raw).ok_or_else(|| {
                    CommandError::malformed("UPDATE PHASE TIME", format!("bad time {raw:?}"))
                })?;
                Self::UpdatePhaseTime {
                    index,
                    start_minutes,
                }
            }
            "UPDATE PHASE TEMP" => {
                let (index, value) = indexed("UPDATE PHASE TEMP", data)?;
                Self::UpdatePhaseTemp {
                    index,
                    target_temp_f: number("UPDATE PHASE TEMP", value)? as f32,
                }
            }
            "START PHASES" => Self::StartPhases(index_list("START PHASES", data)?),
            "CANCEL PHASES" => Self::CancelPhases(index_list("CANCEL PHASES", data)?),
            "DRY" => Self::StartOverride {
                kind: OverrideKind::Drying,
                duration_ms: minutes_to_ms("DRY", data)?,
            },
            "DRY CLEAR" => Self::ClearOverride(OverrideKind::Drying),
            "PAUSE START" => Self::StartOverride {
                kind: OverrideKind::Pause,
                duration_ms: minutes_to_ms("PAUSE START", data)?,
            },
            "PAUSE CLEAR" => Self::ClearOverride(OverrideKind::Pause),
            "HVAC MODE CHECK" => Self::ModeCheck,
            "AUTO MODE CHANGE" => Self::AutoModeChange,
            "DEVICE" => {
                let raw = text("DEVICE", data)?;
                Self::Device(
                    ActiveDevice::parse(raw)
                        .ok_or_else(|| CommandError::malformed("DEVICE", format!("{raw:?}")))?,
                )
            }
            "DIRECT" => Self::Direct(parse_direct(text("DIRECT", data)?)?),
            "MANUAL AC" => Self::Manual {
                equipment: Equipment::Ac,
                on: on_off("MANUAL AC", data)?,
            },
            "MANUAL FAN" => Self::Manual {
                equipment: Equipment::Fan,
                on: on_off("MANUAL FAN", data)?,
            },
            _ => return Err(CommandError::UnknownCommand(request.command.clone())),
        };

        Ok(command)
    }
}

/// Maps the closed set of direct actuation strings onto engine actions.
///
/// Accepts `ac.on`, `fan.off`, `controller.hvac.heat.on()` and similar; only
/// the last two path segments are significant.
pub fn parse_direct(raw: &str) -> Result<EngineAction, CommandError> {
    let normalized = raw.trim().to_ascii_lowercase();
    let normalized = normalized.strip_suffix("()").unwrap_or(&normalized);
    let segments: Vec<&str> = normalized.split('.').filter(|s| !s.is_empty()).collect();

    let [.., device, op] = segments.as_slice() else {
        return Err(CommandError::malformed("DIRECT", format!("{raw:?}")));
    };

    let equipment = match *device {
        "ac" | "cool" | "compressor" => Equipment::Ac,
        "heat" | "heater" => Equipment::Heat,
        "fan" => Equipment::Fan,
        _ => {
            return Err(CommandError::malformed(
                "DIRECT",
                format!("unknown device {device:?}"),
            ))
        }
    };
    let on = match *op {
        "on" => true,
        "off" => false,
        _ => {
            return Err(CommandError::malformed(
                "DIRECT",
                format!("unknown operation {op:?}"),
            ))
        }
    };

    Ok(EngineAction::switch(equipment, on))
}

fn text<'a>(command: &'static str, data: &'a Value) -> Result<&'a str, CommandError> {
    data.as_str()
        .ok_or_else(|| CommandError::malformed(command, "expected a string"))
}

fn number(command: &'static str, data: &Value) -> Result<f64, CommandError> {
    let value = match data {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|v| v.is_finite())
        .ok_or_else(|| CommandError::malformed(command, "expected a number"))
}

fn on_off(command: &'static str, data: &Value) -> Result<bool, CommandError> {
    match data {
        Value::Bool(on) => Ok(*on),
        Value::String(s) => match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(true),
            "OFF" => Ok(false),
            other => Err(CommandError::malformed(command, format!("{other:?}"))),
        },
        _ => Err(CommandError::malformed(command, "expected ON or OFF")),
    }
}

fn index(command: &'static str, data: &Value) -> Result<usize, CommandError> {
    let raw = number(command, data)?;
    if raw < 0.0 || raw.fract() != 0.0 {
        return Err(CommandError::malformed(command, "bad phase index"));
    }
    Ok(raw as usize)
}

fn indexed<'a>(command: &'static str, data: &'a Value) -> Result<(usize, &'a Value), CommandError> {
    match data.as_array().map(Vec::as_slice) {
        Some([idx, value]) => Ok((index(command, idx)?, value)),
        _ => Err(CommandError::malformed(command, "expected [index, value]")),
    }
}

fn index_list(command: &'static str, data: &Value) -> Result<Vec<usize>, CommandError> {
    match data {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(|item| index(command, item)).collect(),
        other => Ok(vec![index(command, other)?]),
    }
}

fn minutes_to_ms(command: &'static str, data: &Value) -> Result<i64, CommandError> {
    let minutes = number(command, data)?;
    Ok((minutes * 60_000.0).round() as i64)
}
