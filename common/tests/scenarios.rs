use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use pretty_assertions::assert_eq;
use serde_json::json;

use hvac_common::{
    config::default_devices, epoch_ms, CommandError, CommandRequest, ControlScheme,
    EngineAction, HvacConfig, HvacMode, ModeArbiter, ModeChangeBlock, PersistedSettings, Phase,
    PhaseScheduler, Reading,
};

const FLEET: [&str; 5] = ["thermostat", "fan", "zone1", "zone2", "outdoor"];

fn at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(7 * 3600)
        .unwrap()
        .with_ymd_and_hms(2026, 8, 14, hour, minute, 0)
        .unwrap()
}

fn arbiter(control: ControlScheme, mode: HvacMode) -> ModeArbiter {
    ModeArbiter::new(
        HvacConfig::default(),
        PersistedSettings {
            control,
            mode,
            ..PersistedSettings::default()
        },
        &default_devices(),
        PhaseScheduler::default(),
    )
}

fn beat(arbiter: &mut ModeArbiter, ids: &[&str], now: DateTime<FixedOffset>) {
    for id in ids {
        arbiter.record_heartbeat(id, epoch_ms(now));
    }
}

fn send(
    arbiter: &mut ModeArbiter,
    command: &str,
    data: serde_json::Value,
    now: DateTime<FixedOffset>,
) -> Result<Vec<EngineAction>, CommandError> {
    arbiter.apply_request(&CommandRequest::new(command, data), now)
}

#[test]
fn thermostat_silence_forces_cooling_off_under_auto() {
    let start = at(14, 0);
    let mut arbiter = arbiter(ControlScheme::Auto, HvacMode::Cooling);
    beat(&mut arbiter, &FLEET, start);
    arbiter.record_reading(
        Reading::ZoneTemp {
            zone: "zone1".to_string(),
            temp: 78.0,
        },
        epoch_ms(start),
    );
    send(&mut arbiter, "START PHASES", json!([0, 1]), start).unwrap();

    assert_eq!(arbiter.tick(start), vec![EngineAction::AcOn]);
    assert_eq!(arbiter.target_temp(), Some(72.0));

    // Everything but the thermostat keeps reporting.
    let mut now = start;
    for _ in 0..3 {
        now += Duration::seconds(5);
        beat(&mut arbiter, &FLEET[1..], now);
        let actions = arbiter.tick(now);
        if !actions.is_empty() {
            assert_eq!(actions, vec![EngineAction::AcOff]);
        }
    }

    let snapshot = arbiter.snapshot(now);
    assert!(!snapshot.ac_status);
    assert!(!snapshot.devices["hvac_heartbeat"]);
    assert!(!snapshot.devices["hvac_ability"]);
    assert!(snapshot.devices["zone1_ability"]);
    assert_eq!(snapshot.current_phase, Some(0));

    // Demand is still there, but nothing may be requested while it is dead.
    assert!(arbiter.tick(now + Duration::seconds(1)).is_empty());

    let back = now + Duration::seconds(2);
    beat(&mut arbiter, &FLEET, back);
    assert_eq!(arbiter.tick(back), vec![EngineAction::AcOn]);
}

#[test]
fn one_missed_heartbeat_is_tolerated() {
    let start = at(9, 0);
    let mut arbiter = arbiter(ControlScheme::Basic, HvacMode::Heating);
    beat(&mut arbiter, &FLEET, start);

    let late = start + Duration::milliseconds(14_999);
    arbiter.tick(late);
    assert!(arbiter.snapshot(late).devices["hvac_ability"]);

    let stale = start + Duration::seconds(15);
    arbiter.tick(stale);
    assert!(!arbiter.snapshot(stale).devices["hvac_ability"]);
}

#[test]
fn set_72_5_deadband_walkthrough() {
    let now = at(16, 0);
    let mut arbiter = arbiter(ControlScheme::Basic, HvacMode::Cooling);
    beat(&mut arbiter, &FLEET, now);
    send(&mut arbiter, "SET", json!(72.5), now).unwrap();

    arbiter.record_reading(Reading::IndoorTemp(75.0), epoch_ms(now));
    assert_eq!(arbiter.tick(now), vec![EngineAction::AcOn]);

    let now = now + Duration::seconds(1);
    arbiter.record_reading(Reading::IndoorTemp(73.0), epoch_ms(now));
    assert!(arbiter.tick(now).is_empty());
    assert!(arbiter.ac_status());

    let now = now + Duration::seconds(1);
    arbiter.record_reading(Reading::IndoorTemp(72.5), epoch_ms(now));
    assert_eq!(arbiter.tick(now), vec![EngineAction::AcOff]);

    // Back inside the band from below: stays off.
    let now = now + Duration::seconds(1);
    arbiter.record_reading(Reading::IndoorTemp(73.4), epoch_ms(now));
    assert!(arbiter.tick(now).is_empty());
    assert!(!arbiter.ac_status());
}

#[test]
fn mode_heat_two_minutes_after_event_is_rejected() {
    let start = at(10, 0);
    let mut arbiter = arbiter(ControlScheme::Basic, HvacMode::Off);
    send(&mut arbiter, "MODE", json!("AC"), start).unwrap();
    assert_eq!(arbiter.last_hvac_event_ms(), Some(epoch_ms(start)));

    let later = start + Duration::minutes(2);
    let err = send(&mut arbiter, "MODE", json!("HEAT"), later).unwrap_err();

    assert_eq!(
        err,
        CommandError::ModeChangeBlocked(ModeChangeBlock::ModeChangeCooldown {
            remaining_ms: 13 * 60_000
        })
    );
    assert_eq!(arbiter.mode(), HvacMode::Cooling);
    let snapshot = arbiter.snapshot(later);
    assert_eq!(snapshot.mode, "AC");
    assert!(!snapshot.mode_change_avail);
    assert_eq!(snapshot.mode_change_block, Some("MODE_CHANGE_COOLDOWN"));
    assert!(snapshot.last_rejection.unwrap().starts_with("MODE"));

    // OFF is never held back by the cooldown.
    send(&mut arbiter, "MODE", json!("OFF"), later).unwrap();
    assert_eq!(arbiter.mode(), HvacMode::Off);
}

#[test]
fn mode_change_avail_truth_table() {
    let start = at(7, 0);

    // Fresh controller: no events, nothing running.
    let mut arbiter = arbiter(ControlScheme::Manual, HvacMode::Off);
    assert!(arbiter.mode_change_avail(epoch_ms(start)));

    // Equipment running blocks regardless of elapsed time.
    send(&mut arbiter, "DIRECT", json!("heat.on"), start).unwrap();
    let much_later = epoch_ms(start + Duration::hours(2));
    assert_eq!(
        arbiter.mode_change_block(much_later),
        Some(ModeChangeBlock::EquipmentRunning)
    );

    // Equipment off, but the switch-off itself is an equipment event.
    let off_at = start + Duration::hours(2);
    send(&mut arbiter, "DIRECT", json!("heat.off"), off_at).unwrap();
    assert!(matches!(
        arbiter.mode_change_block(epoch_ms(off_at + Duration::minutes(4))),
        Some(ModeChangeBlock::EquipmentEventLag { .. })
    ));
    assert!(arbiter.mode_change_avail(epoch_ms(off_at + Duration::minutes(5))));
}

#[test]
fn out_of_range_setpoints_leave_set_temp_unchanged() {
    let now = at(12, 0);
    let mut arbiter = arbiter(ControlScheme::Basic, HvacMode::Off);
    send(&mut arbiter, "SET", json!(70), now).unwrap();

    for bad in [json!(39.9), json!(90.5), json!("hot")] {
        assert!(send(&mut arbiter, "SET", bad, now).is_err());
        assert_eq!(arbiter.settings().set_temp_f, 70.0);
    }
    assert!(arbiter.snapshot(now).last_rejection.is_some());
}

#[test]
fn active_phase_is_stable_across_restart() {
    let mut scheduler = PhaseScheduler {
        enabled: true,
        phases: vec![Phase::new(6 * 60, 72.0), Phase::new(22 * 60, 68.0)],
    };
    let now = at(23, 30);

    let first = scheduler.active_phase(now);
    assert_eq!(first, scheduler.active_phase(now));
    assert_eq!(first.map(|(index, _)| index), Some(1));

    scheduler.disable();
    assert_eq!(scheduler.active_phase(now), None);
    scheduler.enable();
    assert_eq!(scheduler.active_phase(now), first);
}

#[test]
fn drying_window_clears_exactly_at_end() {
    let start = at(13, 0);
    let mut arbiter = arbiter(ControlScheme::Basic, HvacMode::Off);
    beat(&mut arbiter, &FLEET, start);
    send(&mut arbiter, "DRY", json!(1), start).unwrap();

    assert_eq!(arbiter.tick(start), vec![EngineAction::FanOn]);

    let just_before = start + Duration::milliseconds(59_999);
    beat(&mut arbiter, &FLEET, just_before);
    assert!(arbiter.tick(just_before).is_empty());
    assert!(arbiter.snapshot(just_before).drying_status);

    let end = start + Duration::seconds(60);
    beat(&mut arbiter, &FLEET, end);
    assert_eq!(arbiter.tick(end), vec![EngineAction::FanOff]);
    let snapshot = arbiter.snapshot(end);
    assert!(!snapshot.drying_status);
    assert!(!snapshot.alert);
    assert_eq!(snapshot.drying_end, None);
}

#[test]
fn pause_and_drying_run_together() {
    let now = at(13, 0);
    let mut arbiter = arbiter(ControlScheme::Basic, HvacMode::Cooling);
    beat(&mut arbiter, &FLEET, now);
    send(&mut arbiter, "PAUSE START", json!(10), now).unwrap();
    send(&mut arbiter, "DRY", json!(5), now).unwrap();

    let snapshot = arbiter.snapshot(now);
    assert!(snapshot.pause_mode);
    assert!(snapshot.drying_status);

    assert_eq!(
        send(&mut arbiter, "DRY", json!(0), now),
        Err(CommandError::NonPositiveDuration)
    );
    assert_eq!(
        send(&mut arbiter, "PAUSE START", json!(721), now),
        Err(CommandError::DurationTooLong { max_minutes: 720 })
    );
    // The rejected restarts left both windows as they were.
    assert!(arbiter.snapshot(now).pause_mode);
    assert!(arbiter.snapshot(now).drying_status);
}

#[test]
fn replacing_the_schedule_validates_targets() {
    let now = at(8, 0);
    let mut arbiter = arbiter(ControlScheme::Auto, HvacMode::Off);

    let hot = PhaseScheduler {
        enabled: true,
        phases: vec![Phase::new(6 * 60, 95.0)],
    };
    assert!(arbiter.replace_schedule(hot, now).is_err());
    assert_eq!(arbiter.scheduler(), &PhaseScheduler::default());

    let schedule = PhaseScheduler {
        enabled: true,
        phases: vec![
            Phase::new(5 * 60, 70.0),
            Phase::new(12 * 60, 74.0),
            Phase::new(21 * 60, 67.0),
        ],
    };
    arbiter.replace_schedule(schedule, now).unwrap();

    let snapshot = arbiter.snapshot(now);
    assert_eq!(snapshot.phase_times, vec!["05:00", "12:00", "21:00"]);
    assert_eq!(snapshot.current_phase, Some(0));
    assert_eq!(snapshot.target_temp, Some(70.0));
    assert_eq!(
        snapshot.next_phase_change,
        Some(at(12, 0).timestamp())
    );
}

#[test]
fn snapshot_serializes_flat_device_keys() {
    let now = at(18, 0);
    let mut arbiter = arbiter(ControlScheme::Basic, HvacMode::Off);
    beat(&mut arbiter, &["thermostat"], now);

    let value = serde_json::to_value(arbiter.snapshot(now)).unwrap();

    assert_eq!(value["hvac_heartbeat"], json!(true));
    assert_eq!(value["fan_heartbeat"], json!(false));
    assert_eq!(value["mode"], json!("OFF"));
    assert_eq!(value["control"], json!("BASIC"));
    assert_eq!(value["active_device"], json!("HVAC"));
    assert_eq!(value["phase_times"], json!(["06:00", "22:00"]));
}
