use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{info, warn};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::EngineError,
    recorder::build_summary,
    workout::{first_phase, next_phase, PhaseKind, WorkoutConfig},
};

use super::{
    clock::{Clock, SystemClock},
    events::{dispatch, EngineEvent, EventSink},
    state::{EngineStatus, SessionState},
};

/// A tick whose wall-clock drift exceeds this is not counted; the anchor
/// is reset and the ticker rescheduled instead.
const DRIFT_TOLERANCE_MS: i64 = 100;
/// Remaining seconds at which the one-shot countdown announcement fires.
const COUNTDOWN_ANNOUNCE_SECS: u32 = 5;
/// Remaining seconds at which every tick carries a countdown beep.
const COUNTDOWN_BEEP_SECS: u32 = 3;
/// A watchdog sleep overshooting by at least this much is treated as a
/// suspension and reconciled against the wall clock.
const SUSPEND_THRESHOLD_SECS: i64 = 2;

enum TickOutcome {
    Continue,
    Halt,
    Restart,
}

/// Drives a workout session: one authoritative ticker task firing once per
/// second, a liveness watchdog that detects suspended scheduling, and
/// wall-clock reconciliation for time lost while suspended. All events go
/// to a single [`EventSink`].
#[derive(Clone)]
pub struct TimerEngine {
    state: Arc<Mutex<SessionState>>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    tick_interval: Duration,
    liveness_interval: Duration,
}

impl TimerEngine {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self::with_clock(sink, Arc::new(SystemClock))
    }

    pub fn with_clock(sink: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            sink,
            clock,
            tasks: Arc::new(Mutex::new(Vec::new())),
            cancel: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_secs(1),
            liveness_interval: Duration::from_secs(2),
        }
    }

    pub async fn get_state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    pub async fn start(&self, config: WorkoutConfig) -> Result<SessionState, EngineError> {
        self.start_named(config, "Fartlek Workout").await
    }

    /// Begins a session. Fails if one is already running. Emits
    /// `SessionStarted` and the first `PhaseStarted` before the first tick;
    /// a zero-length warm-up is skipped here without events.
    pub async fn start_named(
        &self,
        config: WorkoutConfig,
        name: &str,
    ) -> Result<SessionState, EngineError> {
        config.validate()?;

        let mut events = vec![EngineEvent::SessionStarted];
        {
            let mut state = self.state.lock().await;
            if state.status == EngineStatus::Running {
                return Err(EngineError::SessionAlreadyRunning);
            }

            let now = self.clock.now();
            let (phase, repeat_index) = first_phase(&config);
            events.push(EngineEvent::PhaseStarted {
                phase,
                repeat_index,
                speed_label: config.speed_for(phase).map(|s| s.label()),
            });

            *state = SessionState {
                status: EngineStatus::Running,
                session_id: Some(Uuid::new_v4().to_string()),
                session_name: Some(name.to_string()),
                phase,
                repeat_index,
                remaining_seconds: config.phase_seconds(phase),
                total_planned_seconds: config.total_planned_seconds(),
                is_paused: false,
                countdown_announced: false,
                started_at: Some(now),
                tick_anchor: None,
                tick_count: 0,
                config: Some(config),
            };

            info!(
                "session {} started in {:?} ({}s planned)",
                state.session_id.as_deref().unwrap_or(""),
                phase,
                state.total_planned_seconds
            );
        }

        dispatch(self.sink.as_ref(), events);

        // Anchor after the sinks have run, so slow observers at start do not
        // register as drift on the first tick.
        let snapshot = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();
            state.reset_anchor(now);
            state.clone()
        };

        self.spawn_tasks().await;
        Ok(snapshot)
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().await;
            if state.status != EngineStatus::Running {
                return Err(EngineError::NoActiveSession);
            }
            if state.is_paused {
                return Err(EngineError::AlreadyPaused);
            }
            state.is_paused = true;
        }
        dispatch(self.sink.as_ref(), vec![EngineEvent::Paused]);
        Ok(())
    }

    pub async fn resume(&self) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().await;
            if state.status != EngineStatus::Running {
                return Err(EngineError::NoActiveSession);
            }
            if !state.is_paused {
                return Err(EngineError::NotPaused);
            }
            state.is_paused = false;
            // Ticks were skipped while paused; re-anchor so the next tick
            // is not mistaken for drift.
            let now = self.clock.now();
            state.reset_anchor(now);
        }
        dispatch(self.sink.as_ref(), vec![EngineEvent::Resumed]);
        Ok(())
    }

    /// Halts the session without a completion summary. Both tick sources
    /// are cancelled and joined before `SessionStopped` is emitted, so no
    /// event can arrive after this resolves. The returned snapshot lets the
    /// caller record a partial summary if desired.
    pub async fn stop(&self) -> Result<SessionState, EngineError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.status != EngineStatus::Running {
                return Err(EngineError::NoActiveSession);
            }
            state.status = EngineStatus::Stopped;
            state.is_paused = false;
            state.tick_anchor = None;
            state.clone()
        };

        self.shutdown_tasks().await;
        dispatch(self.sink.as_ref(), vec![EngineEvent::SessionStopped]);
        info!(
            "session {} stopped during {:?}",
            snapshot.session_id.as_deref().unwrap_or(""),
            snapshot.phase
        );
        Ok(snapshot)
    }

    /// One wall-clock second of progress. Invoked by the ticker task; also
    /// public so embedders can drive the engine from their own scheduler.
    pub async fn tick(&self) {
        match self.tick_step().await {
            TickOutcome::Continue => {}
            TickOutcome::Halt => self.cancel_tasks().await,
            // The anchor was already reset; a running ticker respawns
            // itself, a manual driver just keeps driving.
            TickOutcome::Restart => {}
        }
    }

    /// Applies `seconds_elapsed` real seconds in one step, walking through
    /// as many phase transitions as the gap covers and carrying the
    /// remainder forward. Idempotent for a zero gap; ignored while paused.
    pub async fn reconcile_elapsed(
        &self,
        seconds_elapsed: u32,
    ) -> Result<SessionState, EngineError> {
        let mut events = Vec::new();
        let (snapshot, completed) = {
            let mut state = self.state.lock().await;
            if state.status != EngineStatus::Running {
                return Err(EngineError::NoActiveSession);
            }
            if seconds_elapsed == 0 || state.is_paused {
                return Ok(state.clone());
            }
            let config = state.config.clone().ok_or(EngineError::NoActiveSession)?;
            let now = self.clock.now();

            let mut left = seconds_elapsed;
            let mut completed = false;
            loop {
                if left < state.remaining_seconds {
                    state.remaining_seconds -= left;
                    break;
                }
                left -= state.remaining_seconds;
                state.remaining_seconds = 0;
                if advance_phase(&mut state, &config, now, &mut events) {
                    completed = true;
                    break;
                }
            }

            if !completed {
                state.reset_anchor(now);
                events.push(EngineEvent::Tick {
                    remaining_seconds: state.remaining_seconds,
                    phase: state.phase,
                });
            }
            (state.clone(), completed)
        };

        info!(
            "reconciled {}s of elapsed time, now {:?} with {}s remaining",
            seconds_elapsed, snapshot.phase, snapshot.remaining_seconds
        );
        dispatch(self.sink.as_ref(), events);
        if completed {
            self.cancel_tasks().await;
        }
        Ok(snapshot)
    }

    async fn tick_step(&self) -> TickOutcome {
        let mut events = Vec::new();
        let outcome = {
            let mut state = self.state.lock().await;
            if state.status != EngineStatus::Running {
                return TickOutcome::Halt;
            }
            if state.is_paused {
                return TickOutcome::Continue;
            }
            let config = match state.config.clone() {
                Some(config) => config,
                None => return TickOutcome::Halt,
            };

            let now = self.clock.now();
            state.tick_count += 1;
            if let Some(anchor) = state.tick_anchor {
                let expected = anchor + ChronoDuration::seconds(i64::from(state.tick_count));
                let drift_ms = (now - expected).num_milliseconds();
                if drift_ms.abs() > DRIFT_TOLERANCE_MS {
                    warn!("tick drift of {drift_ms}ms detected, rescheduling ticker");
                    state.reset_anchor(now);
                    return TickOutcome::Restart;
                }
            }

            if state.remaining_seconds > 0 {
                state.remaining_seconds -= 1;
            }
            let remaining = state.remaining_seconds;
            let phase = state.phase;
            events.push(EngineEvent::Tick {
                remaining_seconds: remaining,
                phase,
            });

            if remaining > 0 {
                if !state.countdown_announced && remaining <= COUNTDOWN_ANNOUNCE_SECS {
                    state.countdown_announced = true;
                    let (next, _) = next_phase(&config, phase, state.repeat_index);
                    events.push(EngineEvent::CountdownReached {
                        seconds_left: remaining,
                        next_phase: next,
                    });
                }
                if remaining <= COUNTDOWN_BEEP_SECS {
                    events.push(EngineEvent::CountdownTick {
                        seconds_left: remaining,
                    });
                }
                TickOutcome::Continue
            } else if advance_phase(&mut state, &config, now, &mut events) {
                TickOutcome::Halt
            } else {
                TickOutcome::Continue
            }
        };

        dispatch(self.sink.as_ref(), events);
        outcome
    }

    async fn spawn_tasks(&self) {
        let token = CancellationToken::new();
        {
            let mut cancel = self.cancel.lock().await;
            if let Some(old) = cancel.take() {
                old.cancel();
            }
            *cancel = Some(token.clone());
        }

        let mut tasks = self.tasks.lock().await;
        tasks.clear();
        tasks.push(tokio::spawn(Self::ticker_loop(self.clone(), token.clone())));
        tasks.push(tokio::spawn(Self::watchdog_loop(self.clone(), token)));
    }

    async fn cancel_tasks(&self) {
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
    }

    async fn shutdown_tasks(&self) {
        if let Some(token) = self.cancel.lock().await.take() {
            token.cancel();
        }
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Primary tick source. The first fire is one full interval after
    /// start; missed ticks are skipped, never burst, because lost time is
    /// recovered by wall-clock reconciliation instead. Returns a boxed
    /// future because it spawns itself recursively, which would otherwise
    /// make `Send` inference on the opaque future type cyclic.
    fn ticker_loop(
        engine: TimerEngine,
        token: CancellationToken,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
        Box::pin(async move {
            let start = Instant::now() + engine.tick_interval;
            let mut interval = time::interval_at(start, engine.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        match engine.tick_step().await {
                            TickOutcome::Continue => {}
                            TickOutcome::Halt => {
                                token.cancel();
                                break;
                            }
                            TickOutcome::Restart => {
                                // Fresh interval aligned to the reset anchor.
                                let handle = tokio::spawn(Self::ticker_loop(
                                    engine.clone(),
                                    token.clone(),
                                ));
                                let mut tasks = engine.tasks.lock().await;
                                tasks.retain(|h| !h.is_finished());
                                tasks.push(handle);
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    /// Secondary tick source. Proves liveness only: a sleep that overshoots
    /// its interval means the host suspended regular execution, and the
    /// overshoot (a wall-clock delta, never a tick count) is reconciled.
    async fn watchdog_loop(engine: TimerEngine, token: CancellationToken) {
        loop {
            let before = engine.clock.now();
            tokio::select! {
                _ = token.cancelled() => break,
                _ = time::sleep(engine.liveness_interval) => {}
            }

            {
                let state = engine.state.lock().await;
                if state.status != EngineStatus::Running {
                    break;
                }
                if state.is_paused {
                    continue;
                }
            }

            let planned = ChronoDuration::milliseconds(engine.liveness_interval.as_millis() as i64);
            let overshoot = (engine.clock.now() - before) - planned;
            let missed = overshoot.num_seconds();
            if missed >= SUSPEND_THRESHOLD_SECS {
                warn!("scheduling gap of {missed}s detected, reconciling against wall clock");
                if let Err(err) = engine.reconcile_elapsed(missed as u32).await {
                    warn!("reconciliation after suspension failed: {err}");
                }
            }
        }
    }
}

/// Atomic transition to the next phase. Returns true when the session
/// completed, in which case the summary event has been queued and the
/// state is terminal.
fn advance_phase(
    state: &mut SessionState,
    config: &WorkoutConfig,
    now: DateTime<Utc>,
    events: &mut Vec<EngineEvent>,
) -> bool {
    let previous = state.phase;
    events.push(EngineEvent::PhaseEnded { phase: previous });

    let (next, repeat_index) = next_phase(config, previous, state.repeat_index);
    if next.is_terminal() {
        state.phase = PhaseKind::Complete;
        state.status = EngineStatus::Stopped;
        state.remaining_seconds = 0;
        state.is_paused = false;
        state.tick_anchor = None;
        let name = state.session_name.clone().unwrap_or_default();
        let summary = build_summary(&name, config, state, now);
        events.push(EngineEvent::SessionCompleted { summary });
        true
    } else {
        state.phase = next;
        state.repeat_index = repeat_index;
        state.remaining_seconds = config.phase_seconds(next);
        state.countdown_announced = false;
        events.push(EngineEvent::PhaseStarted {
            phase: next,
            repeat_index,
            speed_label: config.speed_for(next).map(|s| s.label()),
        });
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workout::Speed;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Recorded {
        Started,
        PhaseStarted(PhaseKind, u32),
        PhaseEnded(PhaseKind),
        Tick(u32, PhaseKind),
        CountdownReached(u32, PhaseKind),
        CountdownTick(u32),
        Paused,
        Resumed,
        Stopped,
        Completed(u32),
    }

    #[derive(Default)]
    struct RecordingSink {
        events: StdMutex<Vec<Recorded>>,
    }

    impl RecordingSink {
        fn take(&self) -> Vec<Recorded> {
            std::mem::take(&mut self.events.lock().unwrap())
        }

        fn snapshot(&self) -> Vec<Recorded> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn on_session_started(&self) {
            self.events.lock().unwrap().push(Recorded::Started);
        }
        fn on_phase_started(&self, phase: PhaseKind, repeat_index: u32, _label: Option<&str>) {
            self.events
                .lock()
                .unwrap()
                .push(Recorded::PhaseStarted(phase, repeat_index));
        }
        fn on_phase_ended(&self, phase: PhaseKind) {
            self.events.lock().unwrap().push(Recorded::PhaseEnded(phase));
        }
        fn on_tick(&self, remaining: u32, phase: PhaseKind) {
            self.events.lock().unwrap().push(Recorded::Tick(remaining, phase));
        }
        fn on_countdown_reached(&self, seconds_left: u32, next_phase: PhaseKind) {
            self.events
                .lock()
                .unwrap()
                .push(Recorded::CountdownReached(seconds_left, next_phase));
        }
        fn on_countdown_tick(&self, seconds_left: u32) {
            self.events.lock().unwrap().push(Recorded::CountdownTick(seconds_left));
        }
        fn on_paused(&self) {
            self.events.lock().unwrap().push(Recorded::Paused);
        }
        fn on_resumed(&self) {
            self.events.lock().unwrap().push(Recorded::Resumed);
        }
        fn on_session_stopped(&self) {
            self.events.lock().unwrap().push(Recorded::Stopped);
        }
        fn on_session_completed(&self, summary: &crate::recorder::SessionSummary) {
            self.events
                .lock()
                .unwrap()
                .push(Recorded::Completed(summary.completed_repeats));
        }
    }

    struct TestClock {
        now: StdMutex<DateTime<Utc>>,
    }

    impl TestClock {
        fn new() -> Self {
            Self {
                now: StdMutex::new(Utc::now()),
            }
        }

        fn advance_secs(&self, secs: i64) {
            let mut now = self.now.lock().unwrap();
            *now += ChronoDuration::seconds(secs);
        }

        fn advance_ms(&self, ms: i64) {
            let mut now = self.now.lock().unwrap();
            *now += ChronoDuration::milliseconds(ms);
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn harness() -> (TimerEngine, Arc<RecordingSink>, Arc<TestClock>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(TestClock::new());
        let engine = TimerEngine::with_clock(sink.clone(), clock.clone());
        (engine, sink, clock)
    }

    fn config(
        warm_up: u32,
        fast: u32,
        slow: u32,
        repeats: u32,
        cool_down: u32,
    ) -> WorkoutConfig {
        WorkoutConfig {
            warm_up_seconds: warm_up,
            fast_run_seconds: fast,
            slow_run_seconds: slow,
            repeats,
            cool_down_seconds: cool_down,
            fast_speed: Speed::mph(6.0),
            slow_speed: Speed::mph(3.0),
        }
    }

    async fn run_ticks(engine: &TimerEngine, clock: &TestClock, n: u32) {
        for _ in 0..n {
            clock.advance_secs(1);
            engine.tick().await;
        }
    }

    #[tokio::test]
    async fn start_rejects_second_session() {
        let (engine, _sink, _clock) = harness();
        engine.start(config(60, 30, 30, 2, 60)).await.unwrap();
        let err = engine.start(config(60, 30, 30, 2, 60)).await.unwrap_err();
        assert!(matches!(err, EngineError::SessionAlreadyRunning));
    }

    #[tokio::test]
    async fn start_computes_total_planned_seconds() {
        let (engine, _sink, _clock) = harness();
        let state = engine.start(config(300, 30, 60, 5, 300)).await.unwrap();
        assert_eq!(state.total_planned_seconds, 300 + (30 + 60) * 5 + 300);
        assert_eq!(state.phase, PhaseKind::WarmUp);
        assert_eq!(state.remaining_seconds, 300);
    }

    #[tokio::test]
    async fn full_session_walks_every_phase_in_order() {
        let (engine, sink, clock) = harness();
        engine.start(config(2, 1, 1, 2, 1)).await.unwrap();
        run_ticks(&engine, &clock, 7).await;

        let state = engine.get_state().await;
        assert_eq!(state.phase, PhaseKind::Complete);
        assert_eq!(state.status, EngineStatus::Stopped);

        let starts: Vec<_> = sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, Recorded::PhaseStarted(..) | Recorded::Completed(_)))
            .collect();
        assert_eq!(
            starts,
            vec![
                Recorded::PhaseStarted(PhaseKind::WarmUp, 0),
                Recorded::PhaseStarted(PhaseKind::FastRun, 1),
                Recorded::PhaseStarted(PhaseKind::SlowRun, 1),
                Recorded::PhaseStarted(PhaseKind::FastRun, 2),
                Recorded::PhaseStarted(PhaseKind::SlowRun, 2),
                Recorded::PhaseStarted(PhaseKind::CoolDown, 2),
                Recorded::Completed(2),
            ]
        );
    }

    #[tokio::test]
    async fn zero_warm_up_and_cool_down_scenario() {
        let (engine, sink, clock) = harness();
        let state = engine.start(config(0, 30, 60, 1, 0)).await.unwrap();
        assert_eq!(state.phase, PhaseKind::FastRun);
        assert_eq!(state.repeat_index, 1);
        assert_eq!(state.total_planned_seconds, 90);

        run_ticks(&engine, &clock, 91).await;
        let state = engine.get_state().await;
        assert_eq!(state.phase, PhaseKind::Complete);

        let starts: Vec<_> = sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, Recorded::PhaseStarted(..) | Recorded::Completed(_)))
            .collect();
        // FastRun(1), SlowRun(1), then the zero-length cool-down entry
        // before it elapses on the next tick.
        assert_eq!(
            starts,
            vec![
                Recorded::PhaseStarted(PhaseKind::FastRun, 1),
                Recorded::PhaseStarted(PhaseKind::SlowRun, 1),
                Recorded::PhaseStarted(PhaseKind::CoolDown, 1),
                Recorded::Completed(1),
            ]
        );
    }

    #[tokio::test]
    async fn countdown_announced_once_with_beeps_in_last_three() {
        let (engine, sink, clock) = harness();
        engine.start(config(10, 30, 30, 1, 10)).await.unwrap();
        run_ticks(&engine, &clock, 9).await;

        let events = sink.take();
        let announcements: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Recorded::CountdownReached(..)))
            .collect();
        assert_eq!(
            announcements,
            vec![&Recorded::CountdownReached(5, PhaseKind::FastRun)]
        );

        let beeps: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Recorded::CountdownTick(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(beeps, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn pause_freezes_remaining_and_resume_reanchors() {
        let (engine, sink, clock) = harness();
        engine.start(config(10, 30, 30, 1, 10)).await.unwrap();
        run_ticks(&engine, &clock, 2).await;
        assert_eq!(engine.get_state().await.remaining_seconds, 8);

        engine.pause().await.unwrap();
        assert!(matches!(
            engine.pause().await.unwrap_err(),
            EngineError::AlreadyPaused
        ));

        sink.take();
        run_ticks(&engine, &clock, 5).await;
        assert_eq!(engine.get_state().await.remaining_seconds, 8);
        assert!(sink.snapshot().is_empty(), "paused ticks must emit nothing");

        engine.resume().await.unwrap();
        assert!(matches!(
            engine.resume().await.unwrap_err(),
            EngineError::NotPaused
        ));
        run_ticks(&engine, &clock, 1).await;
        assert_eq!(engine.get_state().await.remaining_seconds, 7);
    }

    #[tokio::test]
    async fn reconcile_zero_is_a_no_op() {
        let (engine, sink, clock) = harness();
        engine.start(config(10, 5, 5, 2, 10)).await.unwrap();
        run_ticks(&engine, &clock, 3).await;

        let before = engine.get_state().await;
        sink.take();
        let after = engine.reconcile_elapsed(0).await.unwrap();
        assert_eq!(before, after);
        assert!(sink.snapshot().is_empty());
    }

    #[tokio::test]
    async fn reconcile_walks_multiple_phases_carrying_remainder() {
        let (engine, _sink, _clock) = harness();
        engine.start(config(10, 5, 5, 2, 10)).await.unwrap();

        // 23s = 10 warm-up + 5 fast + 5 slow + 3 into FastRun(2).
        let state = engine.reconcile_elapsed(23).await.unwrap();
        assert_eq!(state.phase, PhaseKind::FastRun);
        assert_eq!(state.repeat_index, 2);
        assert_eq!(state.remaining_seconds, 2);
    }

    #[tokio::test]
    async fn reconcile_spanning_the_whole_session_completes_it() {
        let (engine, sink, _clock) = harness();
        engine.start(config(10, 5, 5, 2, 10)).await.unwrap();

        let state = engine.reconcile_elapsed(10_000).await.unwrap();
        assert_eq!(state.phase, PhaseKind::Complete);
        assert_eq!(state.status, EngineStatus::Stopped);
        assert!(sink
            .snapshot()
            .iter()
            .any(|e| matches!(e, Recorded::Completed(2))));
    }

    #[tokio::test]
    async fn drifting_tick_is_not_counted() {
        let (engine, sink, clock) = harness();
        engine.start(config(10, 30, 30, 1, 10)).await.unwrap();
        run_ticks(&engine, &clock, 2).await;
        sink.take();

        // 3 real seconds pass before one tick arrives: 2s beyond expected.
        clock.advance_secs(3);
        engine.tick().await;

        let state = engine.get_state().await;
        assert_eq!(state.remaining_seconds, 8, "drifting tick must not decrement");
        assert_eq!(state.tick_count, 0, "anchor must be reset");
        assert!(sink.snapshot().is_empty());

        // Subsequent on-schedule ticks count again.
        run_ticks(&engine, &clock, 1).await;
        assert_eq!(engine.get_state().await.remaining_seconds, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_reconciles_a_suspension_gap_exactly_once() {
        let (engine, sink, clock) = harness();
        engine.start(config(30, 30, 30, 1, 30)).await.unwrap();
        // Let both background tasks reach their timers before the gap.
        time::sleep(Duration::from_millis(10)).await;

        // 8 wall-clock seconds vanish while the tokio timers stand still,
        // as during a device suspension.
        clock.advance_secs(8);
        sink.take();
        time::sleep(Duration::from_millis(2100)).await;

        // The watchdog slept 2s but saw 8s pass: a 6s overshoot, applied
        // once. The frozen clock makes every ticker fire read as drift,
        // so no plain decrements can mix into the result.
        let state = engine.get_state().await;
        assert_eq!(state.phase, PhaseKind::WarmUp);
        assert_eq!(state.remaining_seconds, 24);
        let ticks: Vec<_> = sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, Recorded::Tick(..)))
            .collect();
        assert_eq!(ticks, vec![Recorded::Tick(24, PhaseKind::WarmUp)]);

        // Further watchdog rounds with no new gap reconcile nothing.
        time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(engine.get_state().await.remaining_seconds, 24);
        assert!(sink.snapshot().is_empty());

        engine.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_leaves_paused_sessions_alone() {
        let (engine, sink, clock) = harness();
        engine.start(config(30, 30, 30, 1, 30)).await.unwrap();
        time::sleep(Duration::from_millis(10)).await;

        engine.pause().await.unwrap();
        clock.advance_secs(8);
        sink.take();
        time::sleep(Duration::from_millis(2100)).await;

        let state = engine.get_state().await;
        assert!(state.is_paused);
        assert_eq!(state.remaining_seconds, 30);
        assert!(sink.snapshot().is_empty());

        engine.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn drift_restarts_do_not_accumulate_task_handles() {
        let (engine, _sink, _clock) = harness();
        engine.start(config(30, 30, 30, 1, 30)).await.unwrap();

        // The frozen clock turns every ticker fire into a drift restart,
        // one per second of tokio time.
        time::sleep(Duration::from_millis(5500)).await;

        // Watchdog, the ticker winding down, and its replacement.
        assert!(engine.tasks.lock().await.len() <= 3);
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn small_jitter_within_tolerance_still_counts() {
        let (engine, _sink, clock) = harness();
        engine.start(config(10, 30, 30, 1, 10)).await.unwrap();

        clock.advance_ms(1050);
        engine.tick().await;
        assert_eq!(engine.get_state().await.remaining_seconds, 9);
    }

    #[tokio::test]
    async fn stop_emits_nothing_afterwards() {
        let (engine, sink, clock) = harness();
        engine.start(config(10, 30, 30, 3, 10)).await.unwrap();
        run_ticks(&engine, &clock, 4).await;

        let snapshot = engine.stop().await.unwrap();
        assert_eq!(snapshot.status, EngineStatus::Stopped);
        assert_eq!(snapshot.phase, PhaseKind::WarmUp);

        let events = sink.take();
        assert_eq!(events.last(), Some(&Recorded::Stopped));

        run_ticks(&engine, &clock, 5).await;
        assert!(engine.reconcile_elapsed(10).await.is_err());
        assert!(sink.snapshot().is_empty(), "no events after stop resolves");
    }

    #[tokio::test]
    async fn stopped_engine_accepts_a_new_session() {
        let (engine, _sink, clock) = harness();
        engine.start(config(10, 30, 30, 3, 10)).await.unwrap();
        run_ticks(&engine, &clock, 2).await;
        engine.stop().await.unwrap();

        let state = engine.start(config(0, 30, 60, 1, 0)).await.unwrap();
        assert_eq!(state.phase, PhaseKind::FastRun);
    }

    #[tokio::test]
    async fn pause_and_stop_without_session_are_state_errors() {
        let (engine, _sink, _clock) = harness();
        assert!(matches!(
            engine.pause().await.unwrap_err(),
            EngineError::NoActiveSession
        ));
        assert!(matches!(
            engine.stop().await.unwrap_err(),
            EngineError::NoActiveSession
        ));
        assert!(matches!(
            engine.reconcile_elapsed(5).await.unwrap_err(),
            EngineError::NoActiveSession
        ));
    }

    #[tokio::test]
    async fn zero_repeats_goes_straight_to_cool_down() {
        let (engine, sink, clock) = harness();
        engine.start(config(2, 30, 30, 0, 2)).await.unwrap();
        run_ticks(&engine, &clock, 4).await;

        let starts: Vec<_> = sink
            .take()
            .into_iter()
            .filter(|e| matches!(e, Recorded::PhaseStarted(..) | Recorded::Completed(_)))
            .collect();
        assert_eq!(
            starts,
            vec![
                Recorded::PhaseStarted(PhaseKind::WarmUp, 0),
                Recorded::PhaseStarted(PhaseKind::CoolDown, 0),
                Recorded::Completed(0),
            ]
        );
    }

    #[tokio::test]
    async fn stop_during_second_fast_run_reports_one_completed_repeat() {
        let (engine, _sink, clock) = harness();
        let cfg = config(0, 10, 10, 3, 0);
        engine.start(cfg.clone()).await.unwrap();
        // Through FastRun(1) + SlowRun(1) and into FastRun(2).
        run_ticks(&engine, &clock, 23).await;

        let snapshot = engine.stop().await.unwrap();
        assert_eq!(snapshot.phase, PhaseKind::FastRun);
        assert_eq!(snapshot.repeat_index, 2);

        let summary = build_summary("run", &cfg, &snapshot, Utc::now());
        assert_eq!(summary.completed_repeats, 1);
        assert_eq!(summary.total_time, 20);
    }
}
