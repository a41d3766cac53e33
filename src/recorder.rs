//! Builds the persisted summary for a completed or stopped session.
//!
//! Field names mirror the records the original app stored, so history
//! written before this rewrite keeps loading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::state::SessionState;
use crate::workout::{PhaseKind, SpeedUnit, WorkoutConfig};

/// Speed/unit snapshot embedded in summaries and templates. Both speeds are
/// normalized into one unit, the way the original app stored them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeedSnapshot {
    pub fast_run_speed: f64,
    pub slow_run_speed: f64,
    pub units: SpeedUnit,
}

impl SpeedSnapshot {
    pub fn from_config(config: &WorkoutConfig) -> Self {
        let units = config.fast_speed.unit;
        Self {
            fast_run_speed: config.fast_speed.value,
            slow_run_speed: config.slow_speed.in_unit(units),
            units,
        }
    }
}

/// Append-only history record, created once at session end and never
/// mutated afterwards (deletion from history aside).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub name: String,
    pub warm_up: u32,
    pub fast_run: u32,
    pub slow_run: u32,
    pub repeats: u32,
    pub completed_repeats: u32,
    pub cool_down: u32,
    pub total_time: u32,
    pub speeds: SpeedSnapshot,
    pub date: DateTime<Utc>,
    pub intervals: String,
    pub distance: f64,
    pub units: SpeedUnit,
}

/// Pure summary construction. Uses the repeats actually completed, never
/// the planned count, so a session stopped early does not report planned
/// totals as if finished. Only fully completed phases count toward
/// `total_time` and `distance`.
pub fn build_summary(
    name: &str,
    config: &WorkoutConfig,
    state: &SessionState,
    completed_at: DateTime<Utc>,
) -> SessionSummary {
    let completed_repeats = state.repeats_completed();
    let warm_up_done = state.phase != PhaseKind::WarmUp;
    let cool_down_done = state.phase == PhaseKind::Complete;

    let mut total_time = (config.fast_run_seconds + config.slow_run_seconds) * completed_repeats;
    if warm_up_done {
        total_time += config.warm_up_seconds;
    }
    if cool_down_done {
        total_time += config.cool_down_seconds;
    }

    let speeds = SpeedSnapshot::from_config(config);
    let distance = estimate_distance(config, &speeds, completed_repeats, warm_up_done, cool_down_done);

    SessionSummary {
        name: if name.trim().is_empty() {
            "Fartlek Workout".to_string()
        } else {
            name.trim().to_string()
        },
        warm_up: config.warm_up_seconds,
        fast_run: config.fast_run_seconds,
        slow_run: config.slow_run_seconds,
        repeats: config.repeats,
        completed_repeats,
        cool_down: config.cool_down_seconds,
        total_time,
        speeds,
        date: completed_at,
        intervals: format!("{}/{}", completed_repeats, config.repeats),
        distance,
        units: speeds.units,
    }
}

/// Distance from configured speed × duration; no motion data is consulted.
/// Warm-up assumes the average of the two speeds, cool-down the slow speed.
fn estimate_distance(
    config: &WorkoutConfig,
    speeds: &SpeedSnapshot,
    completed_repeats: u32,
    warm_up_done: bool,
    cool_down_done: bool,
) -> f64 {
    let mut distance = 0.0;

    if warm_up_done {
        let warm_up_hours = f64::from(config.warm_up_seconds) / 3600.0;
        distance += warm_up_hours * (speeds.fast_run_speed + speeds.slow_run_speed) / 2.0;
    }

    let fast_hours = f64::from(config.fast_run_seconds) / 3600.0 * f64::from(completed_repeats);
    let slow_hours = f64::from(config.slow_run_seconds) / 3600.0 * f64::from(completed_repeats);
    distance += fast_hours * speeds.fast_run_speed + slow_hours * speeds.slow_run_speed;

    if cool_down_done {
        let cool_down_hours = f64::from(config.cool_down_seconds) / 3600.0;
        distance += cool_down_hours * speeds.slow_run_speed;
    }

    distance
}
