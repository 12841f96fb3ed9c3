use chrono::{DateTime, Duration, FixedOffset, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    #[serde(rename = "startMinutes")]
    pub start_minutes: u16,
    #[serde(rename = "targetTemp")]
    pub target_temp_f: f32,
}

impl Phase {
    pub fn new(start_minutes: u16, target_temp_f: f32) -> Self {
        Self {
            start_minutes,
            target_temp_f,
        }
    }

    pub fn validate(&self) -> bool {
        self.start_minutes < MINUTES_PER_DAY && self.target_temp_f.is_finite()
    }

    pub fn time_label(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.start_minutes / 60,
            self.start_minutes % 60
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseError {
    IndexOutOfRange(usize),
    InvalidTime,
    InvalidTemp,
}

/// Cyclical time-of-day setpoints, armed and cleared as one set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseScheduler {
    pub enabled: bool,
    pub phases: Vec<Phase>,
}

impl Default for PhaseScheduler {
    fn default() -> Self {
        Self {
            enabled: false,
            phases: vec![Phase::new(6 * 60, 72.0), Phase::new(22 * 60, 68.0)],
        }
    }
}

impl PhaseScheduler {
    /// Drops invalid phases loaded from disk; the list keeps its order so
    /// indexes stay stable for commands.
    pub fn normalize(&mut self) {
        self.phases.retain(Phase::validate);
        if self.phases.is_empty() {
            *self = Self::default();
        }
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.phases.is_empty()
    }

    pub fn set_phase_time(&mut self, index: usize, start_minutes: u16) -> Result<(), PhaseError> {
        if start_minutes >= MINUTES_PER_DAY {
            return Err(PhaseError::InvalidTime);
        }
        let phase = self
            .phases
            .get_mut(index)
            .ok_or(PhaseError::IndexOutOfRange(index))?;
        phase.start_minutes = start_minutes;
        Ok(())
    }

    pub fn set_phase_temp(&mut self, index: usize, target_temp_f: f32) -> Result<(), PhaseError> {
        if !target_temp_f.is_finite() {
            return Err(PhaseError::InvalidTemp);
        }
        let phase = self
            .phases
            .get_mut(index)
            .ok_or(PhaseError::IndexOutOfRange(index))?;
        phase.target_temp_f = target_temp_f;
        Ok(())
    }

    /// The phase in force at `now`: the latest start at or before the current
    /// time of day, otherwise the latest phase of the previous day.
    pub fn active_phase(&self, now: DateTime<FixedOffset>) -> Option<(usize, Phase)> {
        if !self.is_enabled() {
            return None;
        }

        let current_minutes = minutes_of_day(now);

        let today = self
            .phases
            .iter()
            .enumerate()
            .filter(|(_, phase)| phase.start_minutes <= current_minutes)
            .max_by_key(|(index, phase)| (phase.start_minutes, *index));

        let best = today.or_else(|| {
            self.phases
                .iter()
                .enumerate()
                .max_by_key(|(index, phase)| (phase.start_minutes, *index))
        });

        best.map(|(index, phase)| (index, *phase))
    }

    pub fn next_change_epoch(&self, now: DateTime<FixedOffset>) -> Option<i64> {
        if !self.is_enabled() {
            return None;
        }

        let now_minute = minutes_of_day(now);
        let mut best: Option<DateTime<FixedOffset>> = None;

        for day_offset in 0..2i64 {
            for phase in &self.phases {
                if day_offset == 0 && phase.start_minutes <= now_minute {
                    continue;
                }

                let date = now.date_naive() + Duration::days(day_offset);
                let hour = u32::from(phase.start_minutes / 60);
                let minute = u32::from(phase.start_minutes % 60);

                let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
                    continue;
                };

                let Some(candidate) = now.offset().from_local_datetime(&naive).single() else {
                    continue;
                };

                if best.map(|current| candidate < current).unwrap_or(true) {
                    best = Some(candidate);
                }
            }
        }

        best.map(|dt| dt.timestamp())
    }
}

pub fn minutes_of_day(now: DateTime<FixedOffset>) -> u16 {
    (now.hour() * 60 + now.minute()) as u16
}

/// Accepts `HH:MM` or an RFC 3339 timestamp; the latter contributes the
/// time of day as written in its own offset.
pub fn parse_phase_time(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    let time = if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        timestamp.time()
    } else {
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()?
    };
    Some((time.hour() * 60 + time.minute()) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(day: u32, hour: u32, minute: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, day, hour, minute, 0)
            .unwrap()
    }

    fn enabled_schedule() -> PhaseScheduler {
        let mut schedule = PhaseScheduler::default();
        schedule.enable();
        schedule
    }

    #[test]
    fn disabled_schedule_has_no_phase() {
        let schedule = PhaseScheduler::default();
        assert_eq!(schedule.active_phase(fixed_time(5, 12, 0)), None);
        assert_eq!(schedule.next_change_epoch(fixed_time(5, 12, 0)), None);
    }

    #[test]
    fn picks_latest_started_phase() {
        let schedule = enabled_schedule();

        let (index, phase) = schedule.active_phase(fixed_time(5, 12, 0)).unwrap();
        assert_eq!(index, 0);
        assert_eq!(phase.target_temp_f, 72.0);

        let (index, _) = schedule.active_phase(fixed_time(5, 22, 0)).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn wraps_to_previous_day_before_first_phase() {
        let schedule = enabled_schedule();

        // 03:00 is still governed by yesterday's 22:00 phase.
        let (index, phase) = schedule.active_phase(fixed_time(5, 3, 0)).unwrap();
        assert_eq!(index, 1);
        assert_eq!(phase.target_temp_f, 68.0);
    }

    #[test]
    fn active_phase_is_stable_across_restart() {
        let mut schedule = enabled_schedule();
        let now = fixed_time(5, 7, 30);

        let first = schedule.active_phase(now);
        assert_eq!(schedule.active_phase(now), first);

        schedule.disable();
        assert_eq!(schedule.active_phase(now), None);
        schedule.enable();
        assert_eq!(schedule.active_phase(now), first);
    }

    #[test]
    fn phase_edits_keep_enable_state() {
        let mut schedule = PhaseScheduler::default();
        schedule.set_phase_time(1, 20 * 60).unwrap();
        schedule.set_phase_temp(1, 65.0).unwrap();

        assert!(!schedule.is_enabled());
        assert_eq!(schedule.phases[1], Phase::new(20 * 60, 65.0));
        assert_eq!(
            schedule.set_phase_time(2, 60),
            Err(PhaseError::IndexOutOfRange(2))
        );
        assert_eq!(
            schedule.set_phase_time(0, MINUTES_PER_DAY),
            Err(PhaseError::InvalidTime)
        );
        assert_eq!(
            schedule.set_phase_temp(0, f32::NAN),
            Err(PhaseError::InvalidTemp)
        );
    }

    #[test]
    fn next_change_rolls_to_tomorrow() {
        let schedule = enabled_schedule();

        let next = schedule.next_change_epoch(fixed_time(5, 9, 0)).unwrap();
        assert_eq!(next, fixed_time(5, 22, 0).timestamp());

        let next = schedule.next_change_epoch(fixed_time(5, 23, 0)).unwrap();
        assert_eq!(next, fixed_time(6, 6, 0).timestamp());
    }

    #[test]
    fn parses_phase_times() {
        assert_eq!(parse_phase_time("06:30"), Some(390));
        assert_eq!(parse_phase_time("2026-10-19T21:15:00-07:00"), Some(21 * 60 + 15));
        assert_eq!(parse_phase_time("2026-10-19T04:05:00Z"), Some(245));
        assert_eq!(parse_phase_time("noon"), None);
    }
}
