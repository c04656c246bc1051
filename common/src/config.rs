use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How outbound actions reach the device. Chosen once per device at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ControlScheme {
    /// IR/RF remote: discrete power codes plus temperature up/down pulses.
    Remote,
    /// Dumb relay: a single on/off actuator.
    Switch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PowerEstimateConfig {
    pub min_power_w: f32,
    pub cop: f32,
}

impl Default for PowerEstimateConfig {
    fn default() -> Self {
        Self {
            min_power_w: 1_200.0,
            cop: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerConfig {
    pub min_cycle_secs: u64,
    pub heat_tolerance: f32,
    pub cold_tolerance: f32,
    pub min_temp: f32,
    pub max_temp: f32,
    pub temp_step: f32,
    pub initial_target: f32,
    pub tick_interval_secs: u64,
    pub scheme: ControlScheme,
    pub power: PowerEstimateConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_cycle_secs: 300,
            heat_tolerance: 0.5,
            cold_tolerance: 0.5,
            min_temp: 10.0,
            max_temp: 30.0,
            temp_step: 1.0,
            initial_target: 20.0,
            tick_interval_secs: 30,
            scheme: ControlScheme::Remote,
            power: PowerEstimateConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(60..=3_600).contains(&self.min_cycle_secs) {
            return Err(ConfigError::MinCycleOutOfRange(self.min_cycle_secs));
        }

        for (name, value) in [
            ("heat_tolerance", self.heat_tolerance),
            ("cold_tolerance", self.cold_tolerance),
        ] {
            if !(value > 0.0 && value <= 5.0) {
                return Err(ConfigError::ToleranceOutOfRange { name, value });
            }
        }

        if !(self.min_temp.is_finite() && self.max_temp.is_finite())
            || self.min_temp >= self.max_temp
        {
            return Err(ConfigError::TemperatureRange {
                min: self.min_temp,
                max: self.max_temp,
            });
        }

        if !(self.min_temp..=self.max_temp).contains(&self.initial_target) {
            return Err(ConfigError::InitialTargetOutOfRange {
                value: self.initial_target,
                min: self.min_temp,
                max: self.max_temp,
            });
        }

        if !(self.temp_step.is_finite() && self.temp_step > 0.0) {
            return Err(ConfigError::TempStep(self.temp_step));
        }

        if self.tick_interval_secs == 0 {
            return Err(ConfigError::TickInterval);
        }

        if !(1.0..=10.0).contains(&self.power.cop) {
            return Err(ConfigError::CopOutOfRange(self.power.cop));
        }

        if !(100.0..=10_000.0).contains(&self.power.min_power_w) {
            return Err(ConfigError::MinPowerOutOfRange(self.power.min_power_w));
        }

        Ok(())
    }

    pub fn clamp_temperature(&self, value: f32) -> f32 {
        value.clamp(self.min_temp, self.max_temp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub client_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "heatpump-controller".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    pub timezone: String,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

fn default_http_port() -> u16 {
    8080
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            timezone: "Europe/Berlin".to_string(),
            network: NetworkConfig::default(),
            http_port: default_http_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(ControllerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let mut config = ControllerConfig {
            min_cycle_secs: 10,
            ..ControllerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::MinCycleOutOfRange(10)));

        config.min_cycle_secs = 300;
        config.cold_tolerance = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ToleranceOutOfRange {
                name: "cold_tolerance",
                ..
            })
        ));

        config.cold_tolerance = 0.5;
        config.min_temp = 30.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TemperatureRange { .. })
        ));

        config.min_temp = 10.0;
        config.power.cop = 0.5;
        assert_eq!(config.validate(), Err(ConfigError::CopOutOfRange(0.5)));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: RuntimeConfig = serde_json::from_str(
            r#"{"timezone":"Europe/Ljubljana","controller":{"min_cycle_secs":600,"scheme":"SWITCH"}}"#,
        )
        .unwrap();

        assert_eq!(config.controller.min_cycle_secs, 600);
        assert_eq!(config.controller.scheme, ControlScheme::Switch);
        assert_eq!(config.controller.power, PowerEstimateConfig::default());
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.network.mqtt_port, 1883);
    }

    #[test]
    fn negative_cycle_duration_does_not_deserialize() {
        let parsed = serde_json::from_str::<ControllerConfig>(r#"{"min_cycle_secs":-5}"#);
        assert!(parsed.is_err());
    }
}
