//! Audio cues for phase transitions and countdowns. A dedicated thread
//! owns the non-Send rodio objects; the rest of the crate talks to it
//! through a command channel.

pub mod tone;

use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::warn;
use rodio::{OutputStream, Sink};

use crate::recorder::SessionSummary;
use crate::timer::EventSink;
use crate::workout::PhaseKind;

use tone::Tone;

const BEEP_GAP: Duration = Duration::from_millis(200);

enum CueCommand {
    PhaseCue(PhaseKind),
    CompletionCue,
    ShortBeep,
    SetVolume(f32),
    Stop,
}

/// Handle to the audio thread. Cheap to clone; the thread is spawned
/// lazily on first use.
#[derive(Clone)]
pub struct CuePlayer {
    tx: Arc<Mutex<Option<Sender<CueCommand>>>>,
}

impl Default for CuePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl CuePlayer {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(Mutex::new(None)),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<CueCommand>> {
        let mut guard = self
            .tx
            .lock()
            .map_err(|_| anyhow!("audio command channel poisoned"))?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<CueCommand>();

        // Dedicated thread holding the non-Send audio objects.
        thread::Builder::new()
            .name("fartlek-audio".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<()> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| anyhow!("failed to create audio output stream: {e}"))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| anyhow!("failed to create audio sink: {e}"))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        CueCommand::PhaseCue(phase) => {
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink) {
                                warn!("audio output unavailable: {err}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                append_phase_pattern(s, phase);
                            }
                        }
                        CueCommand::CompletionCue => {
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink) {
                                warn!("audio output unavailable: {err}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                append_completion_pattern(s);
                            }
                        }
                        CueCommand::ShortBeep => {
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink) {
                                warn!("audio output unavailable: {err}");
                                continue;
                            }
                            if let Some(ref s) = sink {
                                s.append(Tone::new(660.0, Duration::from_millis(100)));
                            }
                        }
                        CueCommand::SetVolume(v) => {
                            if let Some(ref s) = sink {
                                s.set_volume(v.clamp(0.0, 1.0));
                            }
                        }
                        CueCommand::Stop => {
                            if let Some(s_old) = sink.take() {
                                s_old.stop();
                            }
                            _stream = None;
                        }
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn audio thread: {e}"))?;

        let tx_clone = tx.clone();
        *guard = Some(tx);
        Ok(tx_clone)
    }

    fn send(&self, cmd: CueCommand) -> Result<()> {
        let tx = self.ensure_thread()?;
        tx.send(cmd)
            .map_err(|e| anyhow!("audio thread unavailable: {e}"))
    }

    pub fn play_phase_cue(&self, phase: PhaseKind) -> Result<()> {
        self.send(CueCommand::PhaseCue(phase))
    }

    pub fn play_completion_cue(&self) -> Result<()> {
        self.send(CueCommand::CompletionCue)
    }

    /// Single short beep, used for countdown ticks and resume.
    pub fn play_short_beep(&self) -> Result<()> {
        self.send(CueCommand::ShortBeep)
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(CueCommand::SetVolume(volume))
    }

    pub fn stop(&self) -> Result<()> {
        if let Ok(guard) = self.tx.lock() {
            if let Some(tx) = guard.as_ref() {
                let _ = tx.send(CueCommand::Stop);
            }
        }
        Ok(())
    }
}

/// Beep signatures per phase: one beep for warm-up and cool-down, three
/// high beeps for fast running, two low beeps for slow running.
fn append_phase_pattern(sink: &Sink, phase: PhaseKind) {
    match phase {
        PhaseKind::WarmUp | PhaseKind::CoolDown => {
            sink.append(Tone::new(440.0, Duration::from_millis(200)));
        }
        PhaseKind::FastRun => {
            for i in 0..3 {
                if i > 0 {
                    sink.append(Tone::silence(BEEP_GAP));
                }
                sink.append(Tone::new(880.0, Duration::from_millis(100)));
            }
        }
        PhaseKind::SlowRun => {
            for i in 0..2 {
                if i > 0 {
                    sink.append(Tone::silence(BEEP_GAP));
                }
                sink.append(Tone::new(440.0, Duration::from_millis(100)));
            }
        }
        PhaseKind::Complete => append_completion_pattern(sink),
    }
}

/// Ascending three-note pattern for a finished workout.
fn append_completion_pattern(sink: &Sink) {
    for (i, freq) in [660.0, 770.0, 880.0].into_iter().enumerate() {
        if i > 0 {
            sink.append(Tone::silence(BEEP_GAP));
        }
        sink.append(Tone::new(freq, Duration::from_millis(150)));
    }
}

/// `EventSink` adapter playing cues for the events that have one. Playback
/// problems are logged and swallowed; audio must never disturb the timer.
pub struct AudioCueSink {
    player: CuePlayer,
}

impl AudioCueSink {
    pub fn new(player: CuePlayer) -> Self {
        Self { player }
    }
}

impl EventSink for AudioCueSink {
    fn on_phase_started(&self, phase: PhaseKind, _repeat_index: u32, _speed_label: Option<&str>) {
        if let Err(err) = self.player.play_phase_cue(phase) {
            warn!("phase cue failed: {err}");
        }
    }

    fn on_countdown_tick(&self, _seconds_left: u32) {
        if let Err(err) = self.player.play_short_beep() {
            warn!("countdown beep failed: {err}");
        }
    }

    fn on_resumed(&self) {
        if let Err(err) = self.player.play_short_beep() {
            warn!("resume beep failed: {err}");
        }
    }

    fn on_session_completed(&self, _summary: &SessionSummary) {
        if let Err(err) = self.player.play_completion_cue() {
            warn!("completion cue failed: {err}");
        }
    }

    fn on_session_stopped(&self) {
        if let Err(err) = self.player.stop() {
            warn!("audio stop failed: {err}");
        }
    }
}
