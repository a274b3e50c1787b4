//! Data Validator for Range Checking

use crate::error::ValidationError;
use obd_protocol::{EngineParameter, EngineParameterSet, Pid};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Gauge limits per parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// RPM valid range
    pub rpm_range: (f64, f64),
    /// Speed valid range (km/h)
    pub speed_range: (f64, f64),
    /// Coolant, intake air and oil temperature range (°C)
    pub temperature_range: (f64, f64),
    /// Intake manifold pressure range (kPa)
    pub manifold_pressure_range: (f64, f64),
    /// Fuel pressure range (kPa)
    pub fuel_pressure_range: (f64, f64),
    /// Throttle, pedal and fuel level range (%)
    pub percent_range: (f64, f64),
    /// Timing advance range (°)
    pub timing_range: (f64, f64),
    /// Fuel flow range (L/h)
    pub fuel_flow_range: (f64, f64),
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            rpm_range: (0.0, 8000.0),
            speed_range: (0.0, 200.0),
            temperature_range: (-40.0, 215.0),
            manifold_pressure_range: (0.0, 255.0),
            fuel_pressure_range: (0.0, 765.0),
            percent_range: (0.0, 100.0),
            timing_range: (-64.0, 63.5),
            fuel_flow_range: (0.0, 3276.75),
        }
    }
}

/// Result of validating a parameter set
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// Whether all values are valid
    pub valid: bool,
    /// List of validation errors
    pub errors: Vec<ValidationError>,
    /// Number of fields validated
    pub fields_checked: usize,
}

/// Range checker for decoded engine parameters
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NotFinite { field });
        }
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    fn limits(&self, pid: Pid) -> Option<(&'static str, (f64, f64))> {
        let c = &self.config;
        let limits = match pid {
            Pid::Rpm => ("engine_rpm", c.rpm_range),
            Pid::Speed => ("vehicle_speed", c.speed_range),
            Pid::CoolantTemp => ("coolant_temp", c.temperature_range),
            Pid::IntakeAirTemp => ("intake_air_temp", c.temperature_range),
            Pid::OilTemp => ("oil_temp", c.temperature_range),
            Pid::IntakeManifoldPressure => ("manifold_pressure", c.manifold_pressure_range),
            Pid::FuelPressure => ("fuel_pressure", c.fuel_pressure_range),
            Pid::ThrottlePosition => ("throttle_position", c.percent_range),
            Pid::FuelTankLevel => ("fuel_tank_level", c.percent_range),
            Pid::AcceleratorPosition => ("accelerator_position", c.percent_range),
            Pid::TimingAdvance => ("timing_advance", c.timing_range),
            Pid::FuelFlowRate => ("fuel_flow_rate", c.fuel_flow_range),
            Pid::MonitorStatus | Pid::SupportedPids => return None,
        };
        Some(limits)
    }

    /// Check a decoded parameter against its gauge range.
    ///
    /// Bit-field parameters (MIL status, supported PIDs) always pass.
    pub fn validate(&self, parameter: &EngineParameter) -> Result<(), ValidationError> {
        let (Some(value), Some((field, range))) = (parameter.value(), self.limits(parameter.pid()))
        else {
            return Ok(());
        };
        let result = self.validate_range(field, value, range);
        if let Err(e) = &result {
            debug!("Rejected: {}", e);
        }
        result
    }

    /// Check every known value of a parameter set
    pub fn validate_set(&self, set: &EngineParameterSet) -> ValidationResult {
        let mut errors = Vec::new();
        let mut fields_checked = 0;

        for pid in Pid::ALL {
            let (Some(value), Some((field, range))) = (set.get(pid), self.limits(pid)) else {
                continue;
            };
            fields_checked += 1;
            if let Err(e) = self.validate_range(field, value, range) {
                errors.push(e);
            }
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            fields_checked,
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}
