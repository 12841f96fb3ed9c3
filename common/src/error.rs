use thiserror::Error;

/// Why a physical mode change is currently refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChangeBlock {
    EquipmentRunning,
    ModeChangeCooldown { remaining_ms: u64 },
    EquipmentEventLag { remaining_ms: u64 },
}

impl ModeChangeBlock {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EquipmentRunning => "EQUIPMENT_RUNNING",
            Self::ModeChangeCooldown { .. } => "MODE_CHANGE_COOLDOWN",
            Self::EquipmentEventLag { .. } => "EQUIPMENT_EVENT_LAG",
        }
    }
}

impl std::fmt::Display for ModeChangeBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EquipmentRunning => write!(f, "equipment is running"),
            Self::ModeChangeCooldown { remaining_ms } => {
                write!(f, "mode change cooldown, {}s remaining", remaining_ms / 1_000)
            }
            Self::EquipmentEventLag { remaining_ms } => {
                write!(f, "equipment event lag, {}s remaining", remaining_ms / 1_000)
            }
        }
    }
}

/// Every way a command can be refused. A rejected command never changes
/// controller state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("malformed {command} payload: {reason}")]
    Malformed {
        command: &'static str,
        reason: String,
    },

    #[error("temperature {value} outside {min}..={max}")]
    OutOfRange { value: f32, min: f32, max: f32 },

    #[error("unknown zone {0:?}")]
    UnknownZone(String),

    #[error("unknown device {0:?}")]
    UnknownDevice(String),

    #[error("phase index {0} out of range")]
    PhaseIndex(usize),

    #[error("override duration must be positive")]
    NonPositiveDuration,

    #[error("override duration exceeds {max_minutes} minutes")]
    DurationTooLong { max_minutes: u64 },

    #[error("mode change unavailable: {0}")]
    ModeChangeBlocked(ModeChangeBlock),

    #[error("mode check refused while equipment is running")]
    EquipmentRunning,

    #[error("{0} device is unavailable")]
    DeviceUnavailable(&'static str),

    #[error("auto mode change requires AUTO control")]
    NotAutoControl,

    #[error("no mode change recommended")]
    NoModeChangeNeeded,

    #[error("no valid control temperature")]
    NoControlTemperature,
}

impl CommandError {
    pub fn malformed(command: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            command,
            reason: reason.into(),
        }
    }
}
