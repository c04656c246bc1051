use thiserror::Error;

/// Invalid static parameters. Raised once at setup, never at runtime.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("min_cycle_secs must be between 60 and 3600, got {0}")]
    MinCycleOutOfRange(u64),
    #[error("{name} must be in (0, 5], got {value}")]
    ToleranceOutOfRange { name: &'static str, value: f32 },
    #[error("min_temp ({min}) must be below max_temp ({max})")]
    TemperatureRange { min: f32, max: f32 },
    #[error("initial_target {value} is outside [{min}, {max}]")]
    InitialTargetOutOfRange { value: f32, min: f32, max: f32 },
    #[error("temp_step must be positive, got {0}")]
    TempStep(f32),
    #[error("tick_interval_secs must be positive")]
    TickInterval,
    #[error("cop must be between 1.0 and 10.0, got {0}")]
    CopOutOfRange(f32),
    #[error("min_power_w must be between 100 and 10000, got {0}")]
    MinPowerOutOfRange(f32),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("no schedule entry with id '{0}'")]
    UnknownEntry(String),
    #[error("invalid attribute '{field}' for entry '{id}'")]
    InvalidAttribute { id: String, field: &'static str },
}
