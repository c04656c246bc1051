pub mod config;
pub mod controller;
pub mod cycle_guard;
pub mod diagnostics;
pub mod error;
pub mod expr;
pub mod power;
pub mod schedule;
pub mod topics;
pub mod types;

pub use config::{ControlScheme, ControllerConfig, NetworkConfig, PowerEstimateConfig, RuntimeConfig};
pub use controller::{Command, Controller, DeviceAction, TickOutcome};
pub use cycle_guard::{CycleGuard, CycleGuardState};
pub use diagnostics::{DiagnosticsRecord, DiagnosticsRecorder};
pub use error::{ConfigError, ScheduleError};
pub use expr::{Bindings, ExprError, Expression, Value};
pub use power::estimate_power;
pub use schedule::{
    AttributePatch, AttributeSet, AttributeUpdate, DayOfWeek, EvaluationResult, Schedule,
    ScheduleEntry,
};
pub use topics::*;
pub use types::{ControllerStatus, DeviceState, HvacMode, PowerState, Source};
