use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workout::{PhaseKind, WorkoutConfig};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EngineStatus {
    Idle,
    Running,
    Stopped,
}

impl Default for EngineStatus {
    fn default() -> Self {
        EngineStatus::Idle
    }
}

/// Mutable session state, owned exclusively by the timer engine while a
/// session runs. Created on `start`, replaced wholesale on the next
/// `start`; never persisted mid-session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: EngineStatus,
    pub session_id: Option<String>,
    pub session_name: Option<String>,
    pub config: Option<WorkoutConfig>,
    pub phase: PhaseKind,
    /// 1-based, meaningful during FastRun/SlowRun; carried through
    /// CoolDown for completed-repeat accounting.
    pub repeat_index: u32,
    pub remaining_seconds: u32,
    pub total_planned_seconds: u32,
    pub is_paused: bool,
    /// Reset on every phase entry so the 5-second countdown announcement
    /// fires at most once per phase.
    pub countdown_announced: bool,
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock anchor for drift correction; combines with `tick_count`
    /// to compute the expected time of the current tick.
    #[serde(skip)]
    pub tick_anchor: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub tick_count: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: EngineStatus::Idle,
            session_id: None,
            session_name: None,
            config: None,
            phase: PhaseKind::Complete,
            repeat_index: 0,
            remaining_seconds: 0,
            total_planned_seconds: 0,
            is_paused: false,
            countdown_announced: false,
            started_at: None,
            tick_anchor: None,
            tick_count: 0,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repeats fully finished so far. A repeat counts once its SlowRun has
    /// elapsed, so the pair in progress at stop-time does not count.
    pub fn repeats_completed(&self) -> u32 {
        let repeats = self
            .config
            .as_ref()
            .map(|c| c.repeats)
            .unwrap_or(0);
        match self.phase {
            PhaseKind::WarmUp => 0,
            PhaseKind::FastRun | PhaseKind::SlowRun => self.repeat_index.saturating_sub(1),
            PhaseKind::CoolDown | PhaseKind::Complete => repeats,
        }
    }

    pub fn reset_anchor(&mut self, now: DateTime<Utc>) {
        self.tick_anchor = Some(now);
        self.tick_count = 0;
    }
}
