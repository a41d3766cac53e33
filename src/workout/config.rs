use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

use super::PhaseKind;

/// mph → kph factor used everywhere a speed crosses units.
pub const MPH_TO_KPH: f64 = 1.60934;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpeedUnit {
    Mph,
    Kph,
}

impl SpeedUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedUnit::Mph => "mph",
            SpeedUnit::Kph => "kph",
        }
    }
}

impl Default for SpeedUnit {
    fn default() -> Self {
        SpeedUnit::Mph
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Speed {
    pub value: f64,
    pub unit: SpeedUnit,
}

impl Speed {
    pub fn new(value: f64, unit: SpeedUnit) -> Self {
        Self { value, unit }
    }

    pub fn mph(value: f64) -> Self {
        Self::new(value, SpeedUnit::Mph)
    }

    pub fn kph(value: f64) -> Self {
        Self::new(value, SpeedUnit::Kph)
    }

    /// Value converted into `unit`.
    pub fn in_unit(&self, unit: SpeedUnit) -> f64 {
        match (self.unit, unit) {
            (SpeedUnit::Mph, SpeedUnit::Kph) => self.value * MPH_TO_KPH,
            (SpeedUnit::Kph, SpeedUnit::Mph) => self.value / MPH_TO_KPH,
            _ => self.value,
        }
    }

    /// Display form used for announcements, e.g. "6.0 mph".
    pub fn label(&self) -> String {
        format!("{:.1} {}", self.value, self.unit.as_str())
    }
}

/// Immutable once a session starts. Durations are seconds; `repeats == 0`
/// is valid and skips the interval portion entirely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutConfig {
    pub warm_up_seconds: u32,
    pub fast_run_seconds: u32,
    pub slow_run_seconds: u32,
    pub repeats: u32,
    pub cool_down_seconds: u32,
    pub fast_speed: Speed,
    pub slow_speed: Speed,
}

impl WorkoutConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        for (name, speed) in [("fast", &self.fast_speed), ("slow", &self.slow_speed)] {
            if !speed.value.is_finite() || speed.value <= 0.0 {
                return Err(EngineError::Config(format!(
                    "{name} speed must be a positive number, got {}",
                    speed.value
                )));
            }
        }
        if self.checked_total_seconds().is_none() {
            return Err(EngineError::Config(
                "planned duration exceeds the representable range".to_string(),
            ));
        }
        Ok(())
    }

    /// Saturates at `u32::MAX`; `validate` rejects configs that get there.
    pub fn total_planned_seconds(&self) -> u32 {
        self.checked_total_seconds().unwrap_or(u32::MAX)
    }

    fn checked_total_seconds(&self) -> Option<u32> {
        let pair = u128::from(self.fast_run_seconds) + u128::from(self.slow_run_seconds);
        let total = u128::from(self.warm_up_seconds)
            + pair * u128::from(self.repeats)
            + u128::from(self.cool_down_seconds);
        u32::try_from(total).ok()
    }

    pub fn phase_seconds(&self, phase: PhaseKind) -> u32 {
        match phase {
            PhaseKind::WarmUp => self.warm_up_seconds,
            PhaseKind::FastRun => self.fast_run_seconds,
            PhaseKind::SlowRun => self.slow_run_seconds,
            PhaseKind::CoolDown => self.cool_down_seconds,
            PhaseKind::Complete => 0,
        }
    }

    /// Target speed for a phase; only the interval phases have one.
    pub fn speed_for(&self, phase: PhaseKind) -> Option<&Speed> {
        match phase {
            PhaseKind::FastRun => Some(&self.fast_speed),
            PhaseKind::SlowRun => Some(&self.slow_speed),
            _ => None,
        }
    }
}

/// A named workout saved for later reuse. Field names match the records the
/// original app wrote, so pre-existing templates keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedWorkoutTemplate {
    pub name: String,
    pub warm_up: u32,
    pub fast_run: u32,
    pub slow_run: u32,
    pub repeats: u32,
    pub cool_down: u32,
    pub speeds: crate::recorder::SpeedSnapshot,
    pub date: DateTime<Utc>,
}

impl SavedWorkoutTemplate {
    pub fn from_config(name: &str, config: &WorkoutConfig, date: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            warm_up: config.warm_up_seconds,
            fast_run: config.fast_run_seconds,
            slow_run: config.slow_run_seconds,
            repeats: config.repeats,
            cool_down: config.cool_down_seconds,
            speeds: crate::recorder::SpeedSnapshot::from_config(config),
            date,
        }
    }

    pub fn to_config(&self) -> WorkoutConfig {
        WorkoutConfig {
            warm_up_seconds: self.warm_up,
            fast_run_seconds: self.fast_run,
            slow_run_seconds: self.slow_run,
            repeats: self.repeats,
            cool_down_seconds: self.cool_down,
            fast_speed: Speed::new(self.speeds.fast_run_speed, self.speeds.units),
            slow_speed: Speed::new(self.speeds.slow_run_speed, self.speeds.units),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> WorkoutConfig {
        WorkoutConfig {
            warm_up_seconds: 300,
            fast_run_seconds: 30,
            slow_run_seconds: 60,
            repeats: 5,
            cool_down_seconds: 300,
            fast_speed: Speed::mph(6.0),
            slow_speed: Speed::mph(3.0),
        }
    }

    #[test]
    fn total_planned_seconds_matches_formula() {
        let cfg = config();
        assert_eq!(cfg.total_planned_seconds(), 300 + (30 + 60) * 5 + 300);
    }

    #[test]
    fn total_with_zero_repeats_has_no_interval_portion() {
        let mut cfg = config();
        cfg.repeats = 0;
        assert_eq!(cfg.total_planned_seconds(), 600);
    }

    #[test]
    fn speed_unit_conversion_round_trips() {
        let fast = Speed::mph(6.0);
        let kph = fast.in_unit(SpeedUnit::Kph);
        assert!((kph - 9.65604).abs() < 1e-9);
        assert!((Speed::kph(kph).in_unit(SpeedUnit::Mph) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn validate_rejects_non_positive_speed() {
        let mut cfg = config();
        cfg.slow_speed = Speed::mph(0.0);
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));

        cfg.slow_speed = Speed::mph(f64::NAN);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_total_duration_beyond_u32_seconds() {
        let mut cfg = config();
        cfg.fast_run_seconds = u32::MAX;
        cfg.slow_run_seconds = u32::MAX;
        cfg.repeats = u32::MAX;
        assert!(matches!(cfg.validate(), Err(EngineError::Config(_))));
        assert_eq!(cfg.total_planned_seconds(), u32::MAX);
    }

    #[test]
    fn template_round_trips_through_config() {
        let cfg = config();
        let template = SavedWorkoutTemplate::from_config("hills", &cfg, Utc::now());
        assert_eq!(template.to_config(), cfg);
    }
}
