use chrono::{DateTime, Datelike, FixedOffset, Timelike};

use crate::{
    config::{ControlScheme, ControllerConfig},
    cycle_guard::CycleGuard,
    diagnostics::{DiagnosticsRecord, DiagnosticsRecorder},
    error::ScheduleError,
    expr::{Bindings, Value},
    power::estimate_power,
    schedule::{
        AttributeSet, AttributeUpdate, ConditionWarning, DayOfWeek, EvaluationResult, Schedule,
    },
    types::{ControllerStatus, DeviceState, HvacMode, PowerState, Source},
};

/// Outbound, fire-and-forget device action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    PowerOn,
    PowerOff,
    TempUp,
    TempDown,
    ActuatorSet(bool),
}

impl DeviceAction {
    pub fn as_payload(self) -> &'static str {
        match self {
            Self::PowerOn => "POWER_ON",
            Self::PowerOff => "POWER_OFF",
            Self::TempUp => "TEMP_UP",
            Self::TempDown => "TEMP_DOWN",
            Self::ActuatorSet(true) => "ACTUATOR_ON",
            Self::ActuatorSet(false) => "ACTUATOR_OFF",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TurnOn,
    TurnOff,
    SetTargetTemperature(f32),
    ClimateTurnOn,
    ClimateTurnOff,
    ClimateSetTemperature(f32),
    /// Resync the model to what is known about the physical device. Without an
    /// observed power state the modelled state is toggled.
    FixState {
        observed_power: Option<PowerState>,
        observed_target: Option<f32>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub actions: Vec<DeviceAction>,
    pub warnings: Vec<ConditionWarning>,
    pub evaluation: EvaluationResult,
}

#[derive(Debug, Clone)]
struct ClimateState {
    enabled: bool,
    target: f32,
}

#[derive(Debug, Clone, Default)]
struct Readings {
    room: Option<f32>,
    outside: Option<f32>,
}

#[derive(Debug, Clone)]
struct AppliedEntry {
    id: String,
    attributes: AttributeSet,
}

#[derive(Debug, Clone)]
pub struct Controller {
    config: ControllerConfig,
    state: DeviceState,
    /// Setpoint last driven into the device with temperature pulses.
    device_target: f32,
    climate: ClimateState,
    guard: CycleGuard,
    diagnostics: DiagnosticsRecorder,
    schedule: Schedule,
    readings: Readings,
    helpers: Bindings,
    applied: Option<AppliedEntry>,
    pending_off: Option<Source>,
    last_evaluation: Option<EvaluationResult>,
}

impl Controller {
    pub fn new(config: ControllerConfig, state: DeviceState, mut schedule: Schedule) -> Self {
        schedule.normalize();

        let mut guard = CycleGuard::new(config.min_cycle_secs);
        if let Some(since) = state.last_change_at {
            guard.reset(since);
        }

        Self {
            climate: ClimateState {
                enabled: false,
                target: config.initial_target,
            },
            device_target: state.target_temperature,
            config,
            state,
            guard,
            diagnostics: DiagnosticsRecorder::default(),
            schedule,
            readings: Readings::default(),
            helpers: Bindings::new(),
            applied: None,
            pending_off: None,
            last_evaluation: None,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn diagnostics(&self) -> DiagnosticsRecord {
        self.diagnostics.snapshot()
    }

    pub fn pending_off(&self) -> Option<Source> {
        self.pending_off
    }

    pub fn device_setpoint(&self) -> f32 {
        self.device_target
    }

    pub fn climate_enabled(&self) -> bool {
        self.climate.enabled
    }

    pub fn climate_target(&self) -> f32 {
        self.climate.target
    }

    pub fn estimated_power(&self) -> f32 {
        estimate_power(
            &self.config.power,
            self.state.power,
            self.state.target_temperature,
            self.readings.room,
            self.readings.outside,
        )
    }

    pub fn update_room_temperature(&mut self, reading: Option<f32>) {
        self.readings.room = reading.filter(|value| value.is_finite());
    }

    pub fn update_outside_temperature(&mut self, reading: Option<f32>) {
        self.readings.outside = reading.filter(|value| value.is_finite());
    }

    pub fn set_helper(&mut self, name: impl Into<String>, value: Value) {
        self.helpers.insert(name.into(), value);
    }

    pub fn set_schedule(&mut self, mut schedule: Schedule) {
        schedule.normalize();
        self.schedule = schedule;
    }

    pub fn set_attributes(&mut self, update: &AttributeUpdate) -> Result<(), ScheduleError> {
        self.schedule.apply_update(update)
    }

    pub fn handle_command(
        &mut self,
        command: Command,
        now: DateTime<FixedOffset>,
    ) -> Vec<DeviceAction> {
        let mut actions = Vec::new();

        match command {
            Command::TurnOn => self.turn_on(Source::Manual, now, &mut actions),
            Command::TurnOff => self.request_off(Source::Manual, now, &mut actions),
            Command::SetTargetTemperature(value) => {
                if value.is_finite() {
                    self.set_target(value, &mut actions);
                }
            }
            Command::ClimateTurnOn => {
                self.climate.enabled = true;
                self.turn_on(Source::Climate, now, &mut actions);
            }
            Command::ClimateTurnOff => {
                self.climate.enabled = false;
                self.request_off(Source::Climate, now, &mut actions);
            }
            Command::ClimateSetTemperature(value) => {
                if value.is_finite() {
                    self.climate.target = self.config.clamp_temperature(value);
                    self.climate.enabled = true;
                    self.set_target(value, &mut actions);
                    self.turn_on(Source::Climate, now, &mut actions);
                }
            }
            Command::FixState {
                observed_power,
                observed_target,
            } => self.fix(observed_power, observed_target, now),
        }

        actions
    }

    /// One serialized reconciliation step: schedule, climate band, deferred turn-off.
    pub fn tick(&mut self, now: DateTime<FixedOffset>) -> TickOutcome {
        let mut actions = Vec::new();

        let bindings = self.bindings(now);
        let previous = self.applied.as_ref().map(|applied| applied.id.clone());
        let evaluation = self.schedule.evaluate(now, &bindings, previous.as_deref());

        self.apply_schedule(&evaluation, now, &mut actions);
        self.run_climate(now, &mut actions);
        if let Some(source) = self.pending_off {
            self.request_off(source, now, &mut actions);
        }

        self.last_evaluation = Some(evaluation.clone());

        TickOutcome {
            actions,
            warnings: evaluation.warnings.clone(),
            evaluation,
        }
    }

    pub fn status(&self, now: DateTime<FixedOffset>) -> ControllerStatus {
        let evaluation = self.last_evaluation.as_ref();
        let diagnostics = self.diagnostics.snapshot();
        let guarding = self.state.power.is_on() && !self.guard.allowed_to_turn_off(now);

        ControllerStatus {
            power: self.state.power.as_str(),
            target_temperature: self.state.target_temperature,
            device_setpoint: self.device_target,
            turned_on_by: self.state.turned_on_by.map(Source::as_str),
            last_change_epoch: self.state.last_change_at.map(|at| at.timestamp()),
            room_temperature: self.readings.room,
            outside_temperature: self.readings.outside,
            estimated_power_w: self.estimated_power(),
            climate_enabled: self.climate.enabled,
            climate_target_temperature: self.climate.target,
            in_min_cycle: guarding,
            cycle_remaining_secs: if guarding {
                self.guard.remaining(now).num_seconds().max(0) as u64
            } else {
                0
            },
            pending_off: self.pending_off.map(Source::as_str),
            schedule_enabled: self.schedule.enabled,
            active_entry: evaluation
                .and_then(|evaluation| evaluation.active_entry.as_ref())
                .map(|entry| entry.id.clone()),
            condition_passed: evaluation
                .map(|evaluation| evaluation.condition_passed)
                .unwrap_or(false),
            next_schedule_event_epoch: self.schedule.next_event_epoch(now),
            last_turn_on_epoch: diagnostics.last_turn_on_time.map(|at| at.timestamp()),
            last_turn_on_source: diagnostics.last_turn_on_source.map(Source::as_str),
        }
    }

    fn bindings(&self, now: DateTime<FixedOffset>) -> Bindings {
        let mut bindings = self.helpers.clone();

        if let Some(room) = self.readings.room {
            bindings.insert("room_temperature".to_string(), reading(room));
        }
        if let Some(outside) = self.readings.outside {
            bindings.insert("outside_temperature".to_string(), reading(outside));
        }
        bindings.insert(
            "device_on".to_string(),
            Value::Bool(self.state.power.is_on()),
        );
        bindings.insert(
            "target_temperature".to_string(),
            reading(self.state.target_temperature),
        );
        bindings.insert(
            "climate_enabled".to_string(),
            Value::Bool(self.climate.enabled),
        );
        bindings.insert(
            "time".to_string(),
            Value::Text(format!("{:02}:{:02}", now.hour(), now.minute())),
        );
        bindings.insert(
            "weekday".to_string(),
            Value::Text(DayOfWeek::from_chrono(now.weekday()).as_str().to_string()),
        );

        bindings
    }

    fn apply_schedule(
        &mut self,
        evaluation: &EvaluationResult,
        now: DateTime<FixedOffset>,
        actions: &mut Vec<DeviceAction>,
    ) {
        match evaluation.applying_entry() {
            Some(entry) => {
                let unchanged = self.applied.as_ref().is_some_and(|applied| {
                    applied.id == entry.id && applied.attributes == entry.attributes
                });
                if unchanged {
                    return;
                }

                self.apply_attributes(&entry.attributes, now, actions);
                self.applied = Some(AppliedEntry {
                    id: entry.id.clone(),
                    attributes: entry.attributes.clone(),
                });
            }
            None => {
                let Some(ended) = self.applied.take() else {
                    return;
                };

                let owned = self.state.power.is_on()
                    && self.state.turned_on_by == Some(Source::Schedule);
                if owned && !ended.attributes.keep_on && !evaluation.rolls_into_next {
                    self.request_off(Source::Schedule, now, actions);
                }
            }
        }
    }

    fn apply_attributes(
        &mut self,
        attributes: &AttributeSet,
        now: DateTime<FixedOffset>,
        actions: &mut Vec<DeviceAction>,
    ) {
        if attributes.hvac_mode == Some(HvacMode::Off) {
            self.climate.enabled = false;
            self.request_off(Source::Schedule, now, actions);
        } else {
            // Store the new target first so the on-sequence drives straight to it.
            if !self.state.power.is_on() {
                if let Some(target) = attributes.target_temperature {
                    self.state.target_temperature = self.config.clamp_temperature(target);
                }
            }
            self.turn_on(Source::Schedule, now, actions);
        }

        if let Some(target) = attributes.climate_target_temperature {
            self.climate.target = self.config.clamp_temperature(target);
        }
        if let Some(target) = attributes.target_temperature {
            self.set_target(target, actions);
        }
    }

    fn run_climate(&mut self, now: DateTime<FixedOffset>, actions: &mut Vec<DeviceAction>) {
        if !self.climate.enabled {
            return;
        }
        let Some(room) = self.readings.room else {
            return;
        };

        let target = self.climate.target;
        if !self.state.power.is_on() {
            if room < target - self.config.cold_tolerance {
                self.turn_on(Source::Climate, now, actions);
            }
        } else if self.state.turned_on_by == Some(Source::Climate) {
            // A deferred manual or schedule turn-off is never replaced here.
            let climate_may_defer = matches!(self.pending_off, None | Some(Source::Climate));
            if !climate_may_defer {
                return;
            }
            if room > target + self.config.heat_tolerance {
                self.request_off(Source::Climate, now, actions);
            } else if self.pending_off == Some(Source::Climate) {
                self.pending_off = None;
            }
        }
    }

    fn turn_on(
        &mut self,
        source: Source,
        now: DateTime<FixedOffset>,
        actions: &mut Vec<DeviceAction>,
    ) {
        self.pending_off = None;

        if self.state.power.is_on() {
            if matches!(source, Source::Manual | Source::Climate) {
                self.state.turned_on_by = Some(source);
            }
            return;
        }

        self.transition(PowerState::On, source, now);
        match self.config.scheme {
            ControlScheme::Remote => {
                actions.push(DeviceAction::PowerOn);
                self.sync_setpoint(actions);
            }
            ControlScheme::Switch => actions.push(DeviceAction::ActuatorSet(true)),
        }
    }

    /// Turns the device off when the cycle guard allows, otherwise defers the
    /// request to later ticks. A newer request replaces a deferred one.
    fn request_off(
        &mut self,
        source: Source,
        now: DateTime<FixedOffset>,
        actions: &mut Vec<DeviceAction>,
    ) {
        if !self.state.power.is_on() {
            self.pending_off = None;
            return;
        }

        if !self.guard.allowed_to_turn_off(now) {
            self.pending_off = Some(source);
            return;
        }

        self.pending_off = None;
        self.transition(PowerState::Off, source, now);
        actions.push(match self.config.scheme {
            ControlScheme::Remote => DeviceAction::PowerOff,
            ControlScheme::Switch => DeviceAction::ActuatorSet(false),
        });
    }

    fn set_target(&mut self, value: f32, actions: &mut Vec<DeviceAction>) {
        self.state.target_temperature = self.config.clamp_temperature(value);
        if self.state.power.is_on() {
            self.sync_setpoint(actions);
        }
    }

    fn fix(
        &mut self,
        observed_power: Option<PowerState>,
        observed_target: Option<f32>,
        now: DateTime<FixedOffset>,
    ) {
        self.pending_off = None;

        if let Some(target) = observed_target.filter(|value| value.is_finite()) {
            let target = self.config.clamp_temperature(target);
            self.state.target_temperature = target;
            self.device_target = target;
        }

        let desired = observed_power.unwrap_or_else(|| self.state.power.toggled());
        if desired != self.state.power {
            self.transition(desired, Source::Fix, now);
            if desired.is_on() {
                self.device_target = self.state.target_temperature;
            }
        }
    }

    fn transition(&mut self, power: PowerState, source: Source, now: DateTime<FixedOffset>) {
        self.state.power = power;
        self.state.last_change_at = Some(match self.state.last_change_at {
            Some(previous) if previous > now => previous,
            _ => now,
        });
        self.guard.reset(now);

        if power.is_on() {
            self.state.turned_on_by = Some(source);
            self.diagnostics.record_turn_on(now, source);
        } else {
            self.state.turned_on_by = None;
        }
    }

    /// Pulses the remote until the device setpoint matches the target, one
    /// pulse per discretized step.
    fn sync_setpoint(&mut self, actions: &mut Vec<DeviceAction>) {
        if self.config.scheme != ControlScheme::Remote {
            self.device_target = self.state.target_temperature;
            return;
        }

        let steps = |value: f32| (value / self.config.temp_step).round() as i64;
        let delta = steps(self.state.target_temperature) - steps(self.device_target);
        let pulse = if delta > 0 {
            DeviceAction::TempUp
        } else {
            DeviceAction::TempDown
        };

        actions.extend(std::iter::repeat(pulse).take(delta.unsigned_abs() as usize));
        self.device_target = self.state.target_temperature;
    }
}

fn reading(value: f32) -> Value {
    Value::Number((f64::from(value) * 1_000.0).round() / 1_000.0)
}
