use crate::{config::HvacConfig, types::HvacMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    TurnOn,
    TurnOff,
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    OutsideDeadband,
    SetpointReached,
    WithinDeadband,
    ModeOff,
    DewPointCeiling,
    CriticalHvacTemp,
    CriticalHeatSpread,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OutsideDeadband => "OUTSIDE_DEADBAND",
            Self::SetpointReached => "SETPOINT_REACHED",
            Self::WithinDeadband => "WITHIN_DEADBAND",
            Self::ModeOff => "MODE_OFF",
            Self::DewPointCeiling => "DEW_POINT_CEILING",
            Self::CriticalHvacTemp => "CRITICAL_HVAC_TEMP",
            Self::CriticalHeatSpread => "CRITICAL_HEAT_SPREAD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: Decision,
    pub reason: DecisionReason,
}

impl Evaluation {
    fn new(decision: Decision, reason: DecisionReason) -> Self {
        Self { decision, reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdRequest {
    pub mode: HvacMode,
    pub current_temp: f32,
    pub setpoint: f32,
    pub deadband: f32,
    pub inside_dewp: Option<f32>,
    pub hvac_temp: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdController {
    max_dewp: f32,
    critical_hvac_temp: f32,
    critical_hvac_heat_diff: f32,
}

impl ThresholdController {
    pub fn new(config: &HvacConfig) -> Self {
        Self {
            max_dewp: config.max_dewp,
            critical_hvac_temp: config.critical_hvac_temp,
            critical_hvac_heat_diff: config.critical_hvac_heat_diff,
        }
    }

    pub fn evaluate(&self, request: &ThresholdRequest) -> Evaluation {
        match request.mode {
            HvacMode::Off => Evaluation::new(Decision::TurnOff, DecisionReason::ModeOff),
            HvacMode::Cooling => self.evaluate_cooling(request),
            HvacMode::Heating => self.evaluate_heating(request),
        }
    }

    fn evaluate_cooling(&self, request: &ThresholdRequest) -> Evaluation {
        let evaluation = compare(
            request.current_temp - request.setpoint,
            request.deadband,
        );

        let humid = request
            .inside_dewp
            .map(|dewp| dewp > self.max_dewp)
            .unwrap_or(false);
        if evaluation.decision == Decision::TurnOn && humid {
            return Evaluation::new(Decision::NoChange, DecisionReason::DewPointCeiling);
        }

        evaluation
    }

    fn evaluate_heating(&self, request: &ThresholdRequest) -> Evaluation {
        if let Some(hvac_temp) = request.hvac_temp {
            if hvac_temp < self.critical_hvac_temp {
                return Evaluation::new(Decision::TurnOff, DecisionReason::CriticalHvacTemp);
            }
            if (hvac_temp - request.current_temp).abs() > self.critical_hvac_heat_diff {
                return Evaluation::new(Decision::TurnOff, DecisionReason::CriticalHeatSpread);
            }
        }

        compare(request.setpoint - request.current_temp, request.deadband)
    }
}

// `error` is positive when the room is on the side the active mode corrects.
fn compare(error: f32, deadband: f32) -> Evaluation {
    if error > deadband {
        Evaluation::new(Decision::TurnOn, DecisionReason::OutsideDeadband)
    } else if error <= 0.0 {
        Evaluation::new(Decision::TurnOff, DecisionReason::SetpointReached)
    } else {
        Evaluation::new(Decision::NoChange, DecisionReason::WithinDeadband)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> ThresholdController {
        ThresholdController::new(&HvacConfig::default())
    }

    fn request(mode: HvacMode, current_temp: f32, setpoint: f32) -> ThresholdRequest {
        ThresholdRequest {
            mode,
            current_temp,
            setpoint,
            deadband: 1.0,
            inside_dewp: None,
            hvac_temp: None,
        }
    }

    #[test]
    fn cooling_turns_on_above_deadband() {
        let eval = controller().evaluate(&request(HvacMode::Cooling, 75.0, 72.5));
        assert_eq!(eval.decision, Decision::TurnOn);
    }

    #[test]
    fn cooling_holds_inside_deadband() {
        let eval = controller().evaluate(&request(HvacMode::Cooling, 73.0, 72.5));
        assert_eq!(eval.decision, Decision::NoChange);
        assert_eq!(eval.reason, DecisionReason::WithinDeadband);

        // Exactly on the band edge is still inside.
        let eval = controller().evaluate(&request(HvacMode::Cooling, 73.5, 72.5));
        assert_eq!(eval.decision, Decision::NoChange);
    }

    #[test]
    fn cooling_turns_off_at_setpoint() {
        let eval = controller().evaluate(&request(HvacMode::Cooling, 72.5, 72.5));
        assert_eq!(eval.decision, Decision::TurnOff);
        let eval = controller().evaluate(&request(HvacMode::Cooling, 70.0, 72.5));
        assert_eq!(eval.decision, Decision::TurnOff);
    }

    #[test]
    fn heating_mirrors_cooling() {
        let c = controller();
        assert_eq!(
            c.evaluate(&request(HvacMode::Heating, 66.0, 68.0)).decision,
            Decision::TurnOn
        );
        assert_eq!(
            c.evaluate(&request(HvacMode::Heating, 67.5, 68.0)).decision,
            Decision::NoChange
        );
        assert_eq!(
            c.evaluate(&request(HvacMode::Heating, 68.0, 68.0)).decision,
            Decision::TurnOff
        );
    }

    #[test]
    fn off_mode_always_turns_off() {
        let eval = controller().evaluate(&request(HvacMode::Off, 95.0, 72.0));
        assert_eq!(eval.decision, Decision::TurnOff);
        assert_eq!(eval.reason, DecisionReason::ModeOff);
    }

    #[test]
    fn dew_point_ceiling_suppresses_cooling_on() {
        let mut req = request(HvacMode::Cooling, 78.0, 72.0);
        req.inside_dewp = Some(64.0);

        let eval = controller().evaluate(&req);
        assert_eq!(eval.decision, Decision::NoChange);
        assert_eq!(eval.reason, DecisionReason::DewPointCeiling);

        // Turning off is never suppressed.
        req.current_temp = 71.0;
        assert_eq!(controller().evaluate(&req).decision, Decision::TurnOff);
    }

    #[test]
    fn cold_return_air_forces_heat_off() {
        let mut req = request(HvacMode::Heating, 60.0, 70.0);
        req.hvac_temp = Some(40.0);

        let eval = controller().evaluate(&req);
        assert_eq!(eval.decision, Decision::TurnOff);
        assert_eq!(eval.reason, DecisionReason::CriticalHvacTemp);
    }

    #[test]
    fn excessive_heat_spread_forces_heat_off() {
        let mut req = request(HvacMode::Heating, 60.0, 70.0);
        req.hvac_temp = Some(105.0);

        let eval = controller().evaluate(&req);
        assert_eq!(eval.decision, Decision::TurnOff);
        assert_eq!(eval.reason, DecisionReason::CriticalHeatSpread);

        req.hvac_temp = Some(95.0);
        assert_eq!(controller().evaluate(&req).decision, Decision::TurnOn);
    }
}
