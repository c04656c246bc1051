use crate::{config::PowerEstimateConfig, types::PowerState};

/// Estimated electrical draw in watts, rounded to 0.1 W.
///
/// Zero while the device is off. Without an outside reading the estimate is
/// the flat minimum power; without a room reading no extra load is assumed.
pub fn estimate_power(
    config: &PowerEstimateConfig,
    power: PowerState,
    target: f32,
    room: Option<f32>,
    outside: Option<f32>,
) -> f32 {
    if !power.is_on() {
        return 0.0;
    }

    let Some(outside) = outside else {
        return round_tenth(config.min_power_w.max(0.0));
    };

    let temp_diff = (outside - target).abs();
    let efficiency = (1.0 - temp_diff / 50.0).max(0.5);

    let room_target_diff = room.map(|room| target - room).unwrap_or(0.0).max(0.0);
    let load = (1.0 + room_target_diff / 10.0).min(2.0);

    let estimate = config.min_power_w * load / (config.cop * efficiency);
    if estimate.is_finite() {
        round_tenth(estimate.max(0.0))
    } else {
        0.0
    }
}

fn round_tenth(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}
