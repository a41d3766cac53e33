use serde::{Deserialize, Serialize};

use super::WorkoutConfig;

/// One segment of a workout. WarmUp and CoolDown occur at most once;
/// FastRun/SlowRun alternate `repeats` times; Complete is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PhaseKind {
    WarmUp,
    FastRun,
    SlowRun,
    CoolDown,
    Complete,
}

impl PhaseKind {
    pub fn label(&self) -> &'static str {
        match self {
            PhaseKind::WarmUp => "Warm-up",
            PhaseKind::FastRun => "Fast Run",
            PhaseKind::SlowRun => "Slow Run",
            PhaseKind::CoolDown => "Cool-down",
            PhaseKind::Complete => "Complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseKind::Complete)
    }
}

/// Phase a fresh session enters. A zero-length warm-up is skipped here,
/// synchronously and without events; every other phase gets entry events
/// even when zero-length.
pub fn first_phase(config: &WorkoutConfig) -> (PhaseKind, u32) {
    if config.warm_up_seconds > 0 {
        (PhaseKind::WarmUp, 0)
    } else if config.repeats > 0 {
        (PhaseKind::FastRun, 1)
    } else {
        (PhaseKind::CoolDown, 0)
    }
}

/// Deterministic transition table. Total over reachable states; the repeat
/// index is only meaningful for FastRun/SlowRun and is carried through
/// CoolDown so completed-repeat accounting stays intact.
pub fn next_phase(config: &WorkoutConfig, from: PhaseKind, repeat_index: u32) -> (PhaseKind, u32) {
    match from {
        PhaseKind::WarmUp => {
            if config.repeats == 0 {
                (PhaseKind::CoolDown, 0)
            } else {
                (PhaseKind::FastRun, 1)
            }
        }
        PhaseKind::FastRun => (PhaseKind::SlowRun, repeat_index),
        PhaseKind::SlowRun => {
            if repeat_index < config.repeats {
                (PhaseKind::FastRun, repeat_index + 1)
            } else {
                (PhaseKind::CoolDown, repeat_index)
            }
        }
        PhaseKind::CoolDown | PhaseKind::Complete => (PhaseKind::Complete, repeat_index),
    }
}

/// Full planned phase order for a config, terminated by Complete.
pub fn planned_sequence(config: &WorkoutConfig) -> Vec<(PhaseKind, u32)> {
    let mut sequence = Vec::new();
    let (mut phase, mut repeat) = first_phase(config);
    loop {
        sequence.push((phase, repeat));
        if phase.is_terminal() {
            break;
        }
        let (next, next_repeat) = next_phase(config, phase, repeat);
        phase = next;
        repeat = next_repeat;
    }
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workout::Speed;

    fn config(warm_up: u32, repeats: u32, cool_down: u32) -> WorkoutConfig {
        WorkoutConfig {
            warm_up_seconds: warm_up,
            fast_run_seconds: 30,
            slow_run_seconds: 60,
            repeats,
            cool_down_seconds: cool_down,
            fast_speed: Speed::mph(6.0),
            slow_speed: Speed::mph(3.0),
        }
    }

    #[test]
    fn zero_repeats_skips_interval_portion() {
        let cfg = config(300, 0, 300);
        let phases: Vec<_> = planned_sequence(&cfg).iter().map(|(p, _)| *p).collect();
        assert_eq!(
            phases,
            vec![PhaseKind::WarmUp, PhaseKind::CoolDown, PhaseKind::Complete]
        );
    }

    #[test]
    fn zero_warm_up_starts_in_first_interval() {
        assert_eq!(first_phase(&config(0, 3, 300)), (PhaseKind::FastRun, 1));
        assert_eq!(first_phase(&config(0, 0, 300)), (PhaseKind::CoolDown, 0));
    }

    #[test]
    fn interval_portion_alternates_with_monotonic_repeat_index() {
        let repeats = 4;
        let cfg = config(300, repeats, 300);
        let sequence = planned_sequence(&cfg);

        let intervals: Vec<_> = sequence
            .iter()
            .filter(|(p, _)| matches!(p, PhaseKind::FastRun | PhaseKind::SlowRun))
            .collect();
        assert_eq!(intervals.len(), 2 * repeats as usize);

        let mut last_repeat = 0;
        for (i, (phase, repeat)) in intervals.iter().enumerate() {
            let expected = if i % 2 == 0 {
                PhaseKind::FastRun
            } else {
                PhaseKind::SlowRun
            };
            assert_eq!(*phase, expected);
            assert!(*repeat >= last_repeat);
            last_repeat = *repeat;
        }
        assert_eq!(intervals.last().unwrap().1, repeats);
    }

    #[test]
    fn last_slow_run_transitions_to_cool_down() {
        let cfg = config(300, 2, 300);
        assert_eq!(next_phase(&cfg, PhaseKind::SlowRun, 1), (PhaseKind::FastRun, 2));
        assert_eq!(next_phase(&cfg, PhaseKind::SlowRun, 2), (PhaseKind::CoolDown, 2));
        assert_eq!(next_phase(&cfg, PhaseKind::CoolDown, 2), (PhaseKind::Complete, 2));
    }
}
