use std::sync::Arc;

use crate::recorder::SessionSummary;
use crate::workout::PhaseKind;

/// Notifications consumed by external collaborators (audio, speech, UI,
/// persistence). The engine only ever talks to this trait; implementors
/// override the callbacks they care about. Callbacks run on the ticker
/// task and must not call back into the engine.
pub trait EventSink: Send + Sync {
    fn on_session_started(&self) {}
    fn on_phase_started(&self, _phase: PhaseKind, _repeat_index: u32, _speed_label: Option<&str>) {}
    fn on_phase_ended(&self, _phase: PhaseKind) {}
    fn on_tick(&self, _remaining_seconds: u32, _phase: PhaseKind) {}
    fn on_countdown_reached(&self, _seconds_left: u32, _next_phase: PhaseKind) {}
    fn on_countdown_tick(&self, _seconds_left: u32) {}
    fn on_paused(&self) {}
    fn on_resumed(&self) {}
    fn on_session_stopped(&self) {}
    fn on_session_completed(&self, _summary: &SessionSummary) {}
}

/// Forwards every event to a set of sinks, in order.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn on_session_started(&self) {
        for sink in &self.sinks {
            sink.on_session_started();
        }
    }

    fn on_phase_started(&self, phase: PhaseKind, repeat_index: u32, speed_label: Option<&str>) {
        for sink in &self.sinks {
            sink.on_phase_started(phase, repeat_index, speed_label);
        }
    }

    fn on_phase_ended(&self, phase: PhaseKind) {
        for sink in &self.sinks {
            sink.on_phase_ended(phase);
        }
    }

    fn on_tick(&self, remaining_seconds: u32, phase: PhaseKind) {
        for sink in &self.sinks {
            sink.on_tick(remaining_seconds, phase);
        }
    }

    fn on_countdown_reached(&self, seconds_left: u32, next_phase: PhaseKind) {
        for sink in &self.sinks {
            sink.on_countdown_reached(seconds_left, next_phase);
        }
    }

    fn on_countdown_tick(&self, seconds_left: u32) {
        for sink in &self.sinks {
            sink.on_countdown_tick(seconds_left);
        }
    }

    fn on_paused(&self) {
        for sink in &self.sinks {
            sink.on_paused();
        }
    }

    fn on_resumed(&self) {
        for sink in &self.sinks {
            sink.on_resumed();
        }
    }

    fn on_session_stopped(&self) {
        for sink in &self.sinks {
            sink.on_session_stopped();
        }
    }

    fn on_session_completed(&self, summary: &SessionSummary) {
        for sink in &self.sinks {
            sink.on_session_completed(summary);
        }
    }
}

/// Events queued under the state lock and dispatched after it is released,
/// keeping each phase transition atomic with respect to observers.
#[derive(Debug, Clone)]
pub(crate) enum EngineEvent {
    SessionStarted,
    PhaseStarted {
        phase: PhaseKind,
        repeat_index: u32,
        speed_label: Option<String>,
    },
    PhaseEnded {
        phase: PhaseKind,
    },
    Tick {
        remaining_seconds: u32,
        phase: PhaseKind,
    },
    CountdownReached {
        seconds_left: u32,
        next_phase: PhaseKind,
    },
    CountdownTick {
        seconds_left: u32,
    },
    Paused,
    Resumed,
    SessionStopped,
    SessionCompleted {
        summary: SessionSummary,
    },
}

pub(crate) fn dispatch(sink: &dyn EventSink, events: Vec<EngineEvent>) {
    for event in events {
        match event {
            EngineEvent::SessionStarted => sink.on_session_started(),
            EngineEvent::PhaseStarted {
                phase,
                repeat_index,
                speed_label,
            } => sink.on_phase_started(phase, repeat_index, speed_label.as_deref()),
            EngineEvent::PhaseEnded { phase } => sink.on_phase_ended(phase),
            EngineEvent::Tick {
                remaining_seconds,
                phase,
            } => sink.on_tick(remaining_seconds, phase),
            EngineEvent::CountdownReached {
                seconds_left,
                next_phase,
            } => sink.on_countdown_reached(seconds_left, next_phase),
            EngineEvent::CountdownTick { seconds_left } => sink.on_countdown_tick(seconds_left),
            EngineEvent::Paused => sink.on_paused(),
            EngineEvent::Resumed => sink.on_resumed(),
            EngineEvent::SessionStopped => sink.on_session_stopped(),
            EngineEvent::SessionCompleted { summary } => sink.on_session_completed(&summary),
        }
    }
}
