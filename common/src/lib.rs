pub mod arbiter;
pub mod command;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod overrides;
pub mod readings;
pub mod schedule;
pub mod threshold;
pub mod topics;
pub mod types;

pub use arbiter::ModeArbiter;
pub use command::{Command, CommandRequest};
pub use config::{DeviceSpec, HvacConfig, NetworkConfig, PersistedSettings, RuntimeConfig};
pub use error::{CommandError, ModeChangeBlock};
pub use heartbeat::{DeviceKind, HeartbeatMonitor, Liveness, LivenessChange};
pub use overrides::{OverrideKind, OverrideTimers};
pub use readings::Reading;
pub use schedule::{Phase, PhaseScheduler};
pub use topics::*;
pub use types::{
    epoch_ms, ActiveDevice, ControlScheme, EngineAction, Equipment, HvacMode, SystemSnapshot,
};
