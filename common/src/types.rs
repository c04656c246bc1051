use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    Off,
    On,
}

impl PowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Off,
        }
    }
}

/// What triggered the most recent OFF → ON transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Schedule,
    Climate,
    Fix,
    Manual,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule => "SCHEDULE",
            Self::Climate => "CLIMATE",
            Self::Fix => "FIX",
            Self::Manual => "MANUAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HvacMode {
    Off,
    Heat,
}

/// Authoritative model of a device that cannot report its own state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub power: PowerState,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: f32,
    #[serde(rename = "lastChangeAt")]
    pub last_change_at: Option<DateTime<FixedOffset>>,
    #[serde(rename = "turnedOnBy")]
    pub turned_on_by: Option<Source>,
}

impl DeviceState {
    pub fn off(target_temperature: f32) -> Self {
        Self {
            power: PowerState::Off,
            target_temperature,
            last_change_at: None,
            turned_on_by: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub power: &'static str,
    #[serde(rename = "targetTemperature")]
    pub target_temperature: f32,
    #[serde(rename = "deviceSetpoint")]
    pub device_setpoint: f32,
    #[serde(rename = "turnedOnBy")]
    pub turned_on_by: Option<&'static str>,
    #[serde(rename = "lastChangeEpoch")]
    pub last_change_epoch: Option<i64>,
    #[serde(rename = "roomTemperature")]
    pub room_temperature: Option<f32>,
    #[serde(rename = "outsideTemperature")]
    pub outside_temperature: Option<f32>,
    #[serde(rename = "estimatedPowerW")]
    pub estimated_power_w: f32,
    #[serde(rename = "climateEnabled")]
    pub climate_enabled: bool,
    #[serde(rename = "climateTargetTemperature")]
    pub climate_target_temperature: f32,
    #[serde(rename = "inMinCycle")]
    pub in_min_cycle: bool,
    #[serde(rename = "cycleRemainingSecs")]
    pub cycle_remaining_secs: u64,
    #[serde(rename = "pendingOff")]
    pub pending_off: Option<&'static str>,
    #[serde(rename = "scheduleEnabled")]
    pub schedule_enabled: bool,
    #[serde(rename = "activeEntry")]
    pub active_entry: Option<String>,
    #[serde(rename = "conditionPassed")]
    pub condition_passed: bool,
    #[serde(rename = "nextScheduleEventEpoch")]
    pub next_schedule_event_epoch: Option<i64>,
    #[serde(rename = "lastTurnOnEpoch")]
    pub last_turn_on_epoch: Option<i64>,
    #[serde(rename = "lastTurnOnSource")]
    pub last_turn_on_source: Option<&'static str>,
}

/// Parses a sensor payload; `unavailable`, `unknown` and out-of-range values yield no reading.
pub fn parse_temperature_payload(payload: &str) -> Option<f32> {
    let trimmed = payload.trim();
    if trimmed.eq_ignore_ascii_case("unavailable") || trimmed.eq_ignore_ascii_case("unknown") {
        return None;
    }

    trimmed
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite() && (-60.0..=80.0).contains(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_payloads_are_not_readings() {
        assert_eq!(parse_temperature_payload("unavailable"), None);
        assert_eq!(parse_temperature_payload("UNKNOWN"), None);
        assert_eq!(parse_temperature_payload("NaN"), None);
        assert_eq!(parse_temperature_payload("451"), None);
        assert_eq!(parse_temperature_payload(" 21.5 "), Some(21.5));
        assert_eq!(parse_temperature_payload("-12"), Some(-12.0));
    }
}
