pub mod clock;
pub mod engine;
pub mod events;
pub mod state;

pub use clock::{Clock, SystemClock};
pub use engine::TimerEngine;
pub use events::{EventSink, FanoutSink};
pub use state::{EngineStatus, SessionState};
