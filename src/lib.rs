//! Interval (fartlek) workout timer: a drift-corrected countdown engine
//! driving a warm-up / fast-slow repeats / cool-down phase sequence, with
//! audio cues, session summaries, and SQLite persistence.

pub mod audio;
pub mod error;
pub mod recorder;
pub mod store;
pub mod timer;
pub mod workout;

pub use audio::{AudioCueSink, CuePlayer};
pub use error::EngineError;
pub use recorder::{build_summary, SessionSummary, SpeedSnapshot};
pub use store::Store;
pub use timer::{Clock, EngineStatus, EventSink, FanoutSink, SessionState, SystemClock, TimerEngine};
pub use workout::{
    PhaseKind, SavedWorkoutTemplate, Speed, SpeedUnit, WorkoutConfig,
};
