use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use crate::{
    command::{Command, CommandRequest},
    config::{DeviceSpec, HvacConfig, PersistedSettings},
    error::{CommandError, ModeChangeBlock},
    heartbeat::{DeviceKind, HeartbeatMonitor, LivenessChange},
    overrides::{OverrideError, OverrideKind, OverrideTimers},
    readings::{Reading, Readings},
    schedule::{PhaseError, PhaseScheduler},
    threshold::{Decision, Evaluation, ThresholdController, ThresholdRequest},
    types::{
        epoch_ms, epoch_ms_to_rfc3339, ActiveDevice, ControlScheme, EngineAction, Equipment,
        HvacMode, SystemSnapshot,
    },
};

pub const HVAC_KEY: &str = "hvac";
pub const FAN_KEY: &str = "fan";

/// Top-level HVAC state machine. Owns every component and is the only place
/// equipment actions originate from.
#[derive(Debug, Clone)]
pub struct ModeArbiter {
    pub config: HvacConfig,
    settings: PersistedSettings,

    monitor: HeartbeatMonitor,
    scheduler: PhaseScheduler,
    overrides: OverrideTimers,
    threshold: ThresholdController,
    readings: Readings,

    ac_status: bool,
    heat_status: bool,
    fan_status: bool,
    // Fan was switched on by a drying window and must be released after it.
    drying_fan: bool,

    target_temp: Option<f32>,
    current_phase: Option<usize>,
    recommended_mode: Option<HvacMode>,
    last_evaluation: Option<Evaluation>,

    last_hvac_event_ms: Option<u64>,
    last_equipment_event_ms: Option<u64>,
    last_rejection: Option<String>,
}

impl ModeArbiter {
    pub fn new(
        mut config: HvacConfig,
        mut settings: PersistedSettings,
        devices: &[DeviceSpec],
        mut scheduler: PhaseScheduler,
    ) -> Self {
        config.sanitize();
        settings.sanitize(&config);
        scheduler.normalize();

        let monitor = HeartbeatMonitor::new(devices, config.staleness_threshold_ms());
        let overrides =
            OverrideTimers::new(u64::from(config.max_override_minutes).saturating_mul(60_000));
        let threshold = ThresholdController::new(&config);
        let readings = Readings::new(
            config.min_valid_temp_f,
            config.max_valid_temp_f,
            config.sensor_stale_timeout_ms,
        );

        Self {
            config,
            settings,
            monitor,
            scheduler,
            overrides,
            threshold,
            readings,
            ac_status: false,
            heat_status: false,
            fan_status: false,
            drying_fan: false,
            target_temp: None,
            current_phase: None,
            recommended_mode: None,
            last_evaluation: None,
            last_hvac_event_ms: None,
            last_equipment_event_ms: None,
            last_rejection: None,
        }
    }

    pub fn settings(&self) -> &PersistedSettings {
        &self.settings
    }

    pub fn scheduler(&self) -> &PhaseScheduler {
        &self.scheduler
    }

    pub fn monitor(&self) -> &HeartbeatMonitor {
        &self.monitor
    }

    pub fn overrides(&self) -> &OverrideTimers {
        &self.overrides
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn mode(&self) -> HvacMode {
        self.settings.mode
    }

    pub fn control(&self) -> ControlScheme {
        self.settings.control
    }

    pub fn ac_status(&self) -> bool {
        self.ac_status
    }

    pub fn heat_status(&self) -> bool {
        self.heat_status
    }

    pub fn fan_status(&self) -> bool {
        self.fan_status
    }

    pub fn target_temp(&self) -> Option<f32> {
        self.target_temp
    }

    pub fn recommended_mode(&self) -> Option<HvacMode> {
        self.recommended_mode
    }

    pub fn last_evaluation(&self) -> Option<Evaluation> {
        self.last_evaluation
    }

    pub fn last_hvac_event_ms(&self) -> Option<u64> {
        self.last_hvac_event_ms
    }

    pub fn last_equipment_event_ms(&self) -> Option<u64> {
        self.last_equipment_event_ms
    }

    pub fn last_rejection(&self) -> Option<&str> {
        self.last_rejection.as_deref()
    }

    pub fn record_heartbeat(&mut self, device_id: &str, now_ms: u64) -> Option<LivenessChange> {
        self.monitor.record_heartbeat(device_id, now_ms)
    }

    /// Zone readings are only kept for registered zone sensors.
    pub fn record_reading(&mut self, reading: Reading, now_ms: u64) -> bool {
        if let Reading::ZoneTemp { zone, .. } = &reading {
            let registered = self
                .monitor
                .device(zone)
                .is_some_and(|device| device.kind == DeviceKind::ZoneSensor);
            if !registered {
                warn!("dropping reading for unregistered zone {zone:?}");
                return false;
            }
        }
        self.readings.record(reading, now_ms)
    }

    /// Liveness sweep on its own so callers can react to edges before a tick.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<LivenessChange> {
        self.monitor.sweep(now_ms)
    }

    /// Swaps in a whole phase set. Every target must sit inside the set-point
    /// range; on rejection the current schedule is kept.
    pub fn replace_schedule(
        &mut self,
        mut scheduler: PhaseScheduler,
        now: DateTime<FixedOffset>,
    ) -> Result<(), CommandError> {
        scheduler.normalize();
        for phase in &scheduler.phases {
            self.check_temp_range(phase.target_temp_f)?;
        }
        info!(
            "schedule replaced: {} phases, enabled={}",
            scheduler.len(),
            scheduler.enabled
        );
        self.scheduler = scheduler;
        self.refresh_target(now);
        Ok(())
    }

    pub fn mode_change_block(&self, now_ms: u64) -> Option<ModeChangeBlock> {
        if self.ac_status || self.heat_status {
            return Some(ModeChangeBlock::EquipmentRunning);
        }

        if let Some(last) = self.last_hvac_event_ms {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed < self.config.mode_change_time_delta_ms {
                return Some(ModeChangeBlock::ModeChangeCooldown {
                    remaining_ms: self.config.mode_change_time_delta_ms - elapsed,
                });
            }
        }

        if let Some(last) = self.last_equipment_event_ms {
            let elapsed = now_ms.saturating_sub(last);
            if elapsed < self.config.hvac_event_mode_change_lag_ms {
                return Some(ModeChangeBlock::EquipmentEventLag {
                    remaining_ms: self.config.hvac_event_mode_change_lag_ms - elapsed,
                });
            }
        }

        None
    }

    pub fn mode_change_avail(&self, now_ms: u64) -> bool {
        self.mode_change_block(now_ms).is_none()
    }

    /// Requests a physical mode change. Anything other than OFF waits out
    /// both cooldowns; OFF only ever stops equipment and is always accepted.
    pub fn set_mode(
        &mut self,
        mode: HvacMode,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<EngineAction>, CommandError> {
        let now_ms = epoch_ms(now);
        if mode == self.settings.mode {
            return Ok(Vec::new());
        }
        if mode != HvacMode::Off {
            if let Some(block) = self.mode_change_block(now_ms) {
                return Err(CommandError::ModeChangeBlocked(block));
            }
        }

        let mut actions = Vec::new();
        self.switch(Equipment::Ac, false, now_ms, &mut actions);
        self.switch(Equipment::Heat, false, now_ms, &mut actions);
        if self.settings.active_device == ActiveDevice::Fan && !self.drying_fan {
            self.switch(Equipment::Fan, false, now_ms, &mut actions);
        }

        info!(
            "hvac mode {} -> {}",
            self.settings.mode.as_str(),
            mode.as_str()
        );
        self.settings.mode = mode;
        self.last_hvac_event_ms = Some(now_ms);
        self.last_evaluation = None;
        Ok(actions)
    }

    pub fn set_control_scheme(&mut self, scheme: ControlScheme, now: DateTime<FixedOffset>) {
        if scheme != self.settings.control {
            info!(
                "control scheme {} -> {}",
                self.settings.control.as_str(),
                scheme.as_str()
            );
        }
        self.settings.control = scheme;
        self.last_evaluation = None;
        self.refresh_target(now);
    }

    pub fn set_temp(&mut self, temp_f: f32, now: DateTime<FixedOffset>) -> Result<(), CommandError> {
        self.check_temp_range(temp_f)?;
        self.settings.set_temp_f = temp_f;
        self.refresh_target(now);
        Ok(())
    }

    /// Works out which mode current conditions call for. Refused while any
    /// equipment runs so an active cycle is never second-guessed.
    pub fn check_mode(&mut self, now: DateTime<FixedOffset>) -> Result<HvacMode, CommandError> {
        if self.equipment_running() {
            return Err(CommandError::EquipmentRunning);
        }

        let now_ms = epoch_ms(now);
        self.refresh_target(now);
        let current = self
            .control_temp(now_ms)
            .ok_or(CommandError::NoControlTemperature)?;
        let setpoint = self.target_temp.unwrap_or(self.settings.set_temp_f);
        let deadband = self.deadband();

        let recommended = if current > setpoint + deadband {
            HvacMode::Cooling
        } else if current < setpoint - deadband {
            HvacMode::Heating
        } else {
            self.settings.mode
        };

        self.recommended_mode = Some(recommended);
        Ok(recommended)
    }

    pub fn auto_mode_change(
        &mut self,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<EngineAction>, CommandError> {
        if self.settings.control != ControlScheme::Auto {
            return Err(CommandError::NotAutoControl);
        }
        let recommended = self.check_mode(now)?;
        if recommended == self.settings.mode {
            return Err(CommandError::NoModeChangeNeeded);
        }
        self.set_mode(recommended, now)
    }

    pub fn apply_request(
        &mut self,
        request: &CommandRequest,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<EngineAction>, CommandError> {
        match Command::parse(request) {
            Ok(command) => self.apply_command(command, now),
            Err(err) => {
                warn!("rejected command {:?}: {err}", request.command);
                self.last_rejection = Some(format!("{}: {err}", request.command));
                Err(err)
            }
        }
    }

    pub fn apply_command(
        &mut self,
        command: Command,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<EngineAction>, CommandError> {
        let name = command.name();
        let result = self.dispatch(command, now);
        match &result {
            Ok(_) => {
                info!("applied {name}");
                self.last_rejection = None;
            }
            Err(err) => {
                warn!("rejected {name}: {err}");
                self.last_rejection = Some(format!("{name}: {err}"));
            }
        }
        result
    }

    fn dispatch(
        &mut self,
        command: Command,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<EngineAction>, CommandError> {
        let now_ms = epoch_ms(now);
        let mut actions = Vec::new();

        match command {
            Command::Ability { key, on } => {
                if !self.monitor.set_ability(key, on) {
                    return Err(CommandError::UnknownDevice(key.to_string()));
                }
            }
            Command::Mode(mode) => return self.set_mode(mode, now),
            Command::Control(scheme) => self.set_control_scheme(scheme, now),
            Command::SetTemp(temp_f) => self.set_temp(temp_f, now)?,
            Command::ChangeTherm(zone) => {
                let known = self
                    .monitor
                    .device(&zone)
                    .map(|device| {
                        matches!(device.kind, DeviceKind::ZoneSensor | DeviceKind::Thermostat)
                    })
                    .unwrap_or(false);
                if !known {
                    return Err(CommandError::UnknownZone(zone));
                }
                self.settings.active_therm = zone;
            }
            Command::UpdatePhaseTime {
                index,
                start_minutes,
            } => {
                self.scheduler
                    .set_phase_time(index, start_minutes)
                    .map_err(|err| phase_error("UPDATE PHASE TIME", err))?;
                self.refresh_target(now);
            }
            Command::UpdatePhaseTemp {
                index,
                target_temp_f,
            } => {
                self.check_temp_range(target_temp_f)?;
                self.scheduler
                    .set_phase_temp(index, target_temp_f)
                    .map_err(|err| phase_error("UPDATE PHASE TEMP", err))?;
                self.refresh_target(now);
            }
            Command::StartPhases(indexes) => {
                self.check_phase_indexes(&indexes)?;
                self.scheduler.enable();
                self.refresh_target(now);
            }
            Command::CancelPhases(indexes) => {
                self.check_phase_indexes(&indexes)?;
                self.scheduler.disable();
                self.refresh_target(now);
            }
            Command::StartOverride { kind, duration_ms } => {
                self.overrides
                    .start(kind, duration_ms, now_ms)
                    .map_err(|err| match err {
                        OverrideError::NonPositiveDuration => CommandError::NonPositiveDuration,
                        OverrideError::TooLong { max_ms } => CommandError::DurationTooLong {
                            max_minutes: max_ms / 60_000,
                        },
                    })?;
            }
            Command::ClearOverride(kind) => {
                self.overrides.clear(kind);
            }
            Command::ModeCheck => {
                self.check_mode(now)?;
            }
            Command::AutoModeChange => return self.auto_mode_change(now),
            Command::Device(device) => {
                if device != self.settings.active_device {
                    match self.settings.active_device {
                        ActiveDevice::Hvac => {
                            self.switch(Equipment::Ac, false, now_ms, &mut actions);
                            self.switch(Equipment::Heat, false, now_ms, &mut actions);
                        }
                        ActiveDevice::Fan if !self.drying_fan => {
                            self.switch(Equipment::Fan, false, now_ms, &mut actions);
                        }
                        ActiveDevice::Fan => {}
                    }
                    self.settings.active_device = device;
                    self.last_evaluation = None;
                }
            }
            Command::Direct(action) => {
                // Bypasses arbitration: always forwarded, status tracks it.
                self.switch(action.equipment(), action.is_on(), now_ms, &mut actions);
                if !actions.contains(&action) {
                    actions.push(action);
                }
            }
            Command::Manual { equipment, on } => {
                if on && !self.is_available(equipment) {
                    return Err(CommandError::DeviceUnavailable(equipment_key(equipment)));
                }
                self.switch(equipment, on, now_ms, &mut actions);
            }
        }

        Ok(actions)
    }

    pub fn tick(&mut self, now: DateTime<FixedOffset>) -> Vec<EngineAction> {
        let now_ms = epoch_ms(now);
        let mut actions = Vec::new();

        self.overrides.tick(now_ms);
        self.monitor.sweep(now_ms);
        self.enforce_availability(now_ms, &mut actions);
        self.refresh_target(now);

        if self.apply_drying(now_ms, &mut actions) {
            return actions;
        }

        if self.settings.control == ControlScheme::Manual {
            return actions;
        }

        // Paused: nothing new is requested, running equipment stays as-is.
        if self.overrides.is_active(OverrideKind::Pause, now_ms) {
            return actions;
        }

        self.evaluate_state(now_ms, &mut actions);
        actions
    }

    pub fn snapshot(&self, now: DateTime<FixedOffset>) -> SystemSnapshot {
        let now_ms = epoch_ms(now);
        let drying = self.overrides.window(OverrideKind::Drying);
        let pause = self.overrides.window(OverrideKind::Pause);
        let drying_status = drying.is_active_at(now_ms);

        let mut devices = BTreeMap::new();
        for device in self.monitor.devices() {
            devices.insert(format!("{}_heartbeat", device.key), device.is_alive());
            devices.insert(format!("{}_ability", device.key), device.ability());
        }

        let zone_temps = self
            .readings
            .zone_temps
            .keys()
            .filter_map(|zone| Some((zone.clone(), self.readings.zone(zone, now_ms)?)))
            .collect();

        let phases = &self.scheduler.phases;
        let armed = self.scheduler.is_enabled();

        SystemSnapshot {
            timestamp: now.to_rfc3339(),
            mode: self.settings.mode.as_str(),
            control: self.settings.control.as_str(),
            ac_status: self.ac_status,
            heat_status: self.heat_status,
            fan_status: self.fan_status,
            devices,
            current_temp: self.control_temp(now_ms),
            set_temp: self.settings.set_temp_f,
            target_temp: self.target_temp,
            outside_temp: self.readings.fresh(self.readings.outside_temp, now_ms),
            inside_dewp: self.readings.fresh(self.readings.inside_dewp, now_ms),
            outside_dewp: self.readings.fresh(self.readings.outside_dewp, now_ms),
            hvac_temp: self.readings.fresh(self.readings.hvac_temp, now_ms),
            hvac_mode: self.recommended_mode.map(HvacMode::as_str),
            active_therm: self.settings.active_therm.clone(),
            zone_temps,
            phase_times: phases.iter().map(|phase| phase.time_label()).collect(),
            phase_sets: phases.iter().map(|phase| phase.target_temp_f).collect(),
            active_phases: vec![armed; phases.len()],
            current_phase: self.current_phase,
            next_phase_change: self.scheduler.next_change_epoch(now),
            drying_end: drying.end_ms.and_then(epoch_ms_to_rfc3339),
            drying_status,
            pause_end: pause.end_ms.and_then(epoch_ms_to_rfc3339),
            pause_mode: pause.is_active_at(now_ms),
            alert: drying_status,
            last_hvac_event: self.last_hvac_event_ms.and_then(epoch_ms_to_rfc3339),
            last_equipment_event: self.last_equipment_event_ms.and_then(epoch_ms_to_rfc3339),
            mode_change_avail: self.mode_change_avail(now_ms),
            mode_change_block: self.mode_change_block(now_ms).map(ModeChangeBlock::as_str),
            active_device: self.settings.active_device.as_str(),
            last_rejection: self.last_rejection.clone(),
        }
    }

    fn enforce_availability(&mut self, now_ms: u64, actions: &mut Vec<EngineAction>) {
        if !self.monitor.is_available(HVAC_KEY) && (self.ac_status || self.heat_status) {
            warn!("hvac unavailable, forcing equipment off");
            self.switch(Equipment::Ac, false, now_ms, actions);
            self.switch(Equipment::Heat, false, now_ms, actions);
        }
        if !self.monitor.is_available(FAN_KEY) && self.fan_status {
            warn!("fan unavailable, forcing it off");
            self.switch(Equipment::Fan, false, now_ms, actions);
            self.drying_fan = false;
        }
    }

    /// Returns true while a drying window owns the equipment.
    fn apply_drying(&mut self, now_ms: u64, actions: &mut Vec<EngineAction>) -> bool {
        if !self.overrides.is_active(OverrideKind::Drying, now_ms) {
            if self.drying_fan {
                self.drying_fan = false;
                self.switch(Equipment::Fan, false, now_ms, actions);
            }
            return false;
        }

        self.switch(Equipment::Ac, false, now_ms, actions);
        self.switch(Equipment::Heat, false, now_ms, actions);
        if !self.fan_status && self.monitor.is_available(FAN_KEY) {
            self.switch(Equipment::Fan, true, now_ms, actions);
            self.drying_fan = true;
        }
        true
    }

    fn evaluate_state(&mut self, now_ms: u64, actions: &mut Vec<EngineAction>) {
        let mode = self.settings.mode;

        // Never leave the opposite equipment running after a mode flip.
        match mode {
            HvacMode::Cooling => self.switch(Equipment::Heat, false, now_ms, actions),
            HvacMode::Heating => self.switch(Equipment::Ac, false, now_ms, actions),
            HvacMode::Off => {
                self.switch(Equipment::Ac, false, now_ms, actions);
                self.switch(Equipment::Heat, false, now_ms, actions);
            }
        }

        let Some(equipment) = self.controlled_equipment() else {
            if self.settings.active_device == ActiveDevice::Fan {
                self.switch(Equipment::Fan, false, now_ms, actions);
            }
            self.last_evaluation = None;
            return;
        };

        let Some(current_temp) = self.control_temp(now_ms) else {
            if self.status(equipment) {
                warn!("control temperature stale, switching {} off", equipment.as_str());
            }
            self.switch(equipment, false, now_ms, actions);
            self.last_evaluation = None;
            return;
        };
        let Some(setpoint) = self.target_temp else {
            return;
        };

        let request = ThresholdRequest {
            mode,
            current_temp,
            setpoint,
            deadband: self.deadband(),
            inside_dewp: self.readings.fresh(self.readings.inside_dewp, now_ms),
            hvac_temp: self.readings.fresh(self.readings.hvac_temp, now_ms),
        };
        let evaluation = self.threshold.evaluate(&request);
        self.last_evaluation = Some(evaluation);

        match evaluation.decision {
            Decision::TurnOn if self.is_available(equipment) => {
                self.switch(equipment, true, now_ms, actions);
            }
            Decision::TurnOn => {}
            Decision::TurnOff => self.switch(equipment, false, now_ms, actions),
            Decision::NoChange => {}
        }
    }

    fn refresh_target(&mut self, now: DateTime<FixedOffset>) {
        let phase = self.scheduler.active_phase(now);
        self.current_phase = phase.map(|(index, _)| index);

        self.target_temp = match self.settings.control {
            ControlScheme::Manual => None,
            ControlScheme::Basic => Some(self.settings.set_temp_f),
            ControlScheme::Auto => Some(
                phase
                    .map(|(_, phase)| phase.target_temp_f)
                    .unwrap_or(self.settings.set_temp_f),
            ),
        };
    }

    fn control_temp(&self, now_ms: u64) -> Option<f32> {
        if self.settings.control == ControlScheme::Auto {
            let zone = &self.settings.active_therm;
            if let Some(device) = self.monitor.device(zone) {
                if device.kind == DeviceKind::ZoneSensor {
                    return self.readings.zone(zone, now_ms);
                }
            }
        }
        self.readings.fresh(self.readings.indoor_temp, now_ms)
    }

    fn deadband(&self) -> f32 {
        match self.settings.control {
            ControlScheme::Auto => self.config.auto_threshold_range,
            _ => self.config.basic_threshold_range,
        }
    }

    fn controlled_equipment(&self) -> Option<Equipment> {
        match (self.settings.active_device, self.settings.mode) {
            (_, HvacMode::Off) => None,
            (ActiveDevice::Hvac, HvacMode::Cooling) => Some(Equipment::Ac),
            (ActiveDevice::Hvac, HvacMode::Heating) => Some(Equipment::Heat),
            (ActiveDevice::Fan, HvacMode::Cooling) => Some(Equipment::Fan),
            // A fan cannot heat.
            (ActiveDevice::Fan, HvacMode::Heating) => None,
        }
    }

    fn equipment_running(&self) -> bool {
        self.ac_status || self.heat_status || self.fan_status
    }

    fn is_available(&self, equipment: Equipment) -> bool {
        self.monitor.is_available(equipment_key(equipment))
    }

    fn status(&self, equipment: Equipment) -> bool {
        match equipment {
            Equipment::Ac => self.ac_status,
            Equipment::Heat => self.heat_status,
            Equipment::Fan => self.fan_status,
        }
    }

    fn switch(
        &mut self,
        equipment: Equipment,
        on: bool,
        now_ms: u64,
        actions: &mut Vec<EngineAction>,
    ) {
        if self.status(equipment) == on {
            return;
        }

        match equipment {
            Equipment::Ac => self.ac_status = on,
            Equipment::Heat => self.heat_status = on,
            Equipment::Fan => self.fan_status = on,
        }
        self.last_equipment_event_ms = Some(now_ms);
        actions.push(EngineAction::switch(equipment, on));
    }

    fn check_temp_range(&self, temp_f: f32) -> Result<(), CommandError> {
        if !self.config.set_temp_range().contains(&temp_f) {
            return Err(CommandError::OutOfRange {
                value: temp_f,
                min: self.config.min_set_temp,
                max: self.config.max_set_temp,
            });
        }
        Ok(())
    }

    fn check_phase_indexes(&self, indexes: &[usize]) -> Result<(), CommandError> {
        match indexes.iter().find(|index| **index >= self.scheduler.len()) {
            Some(index) => Err(CommandError::PhaseIndex(*index)),
            None => Ok(()),
        }
    }
}

fn equipment_key(equipment: Equipment) -> &'static str {
    match equipment {
        Equipment::Ac | Equipment::Heat => HVAC_KEY,
        Equipment::Fan => FAN_KEY,
    }
}

fn phase_error(command: &'static str, err: PhaseError) -> CommandError {
    match err {
        PhaseError::IndexOutOfRange(index) => CommandError::PhaseIndex(index),
        PhaseError::InvalidTime => CommandError::malformed(command, "time of day out of range"),
        PhaseError::InvalidTemp => CommandError::malformed(command, "temperature not finite"),
    }
}
