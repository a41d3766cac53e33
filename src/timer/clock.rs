use chrono::{DateTime, Utc};

/// Wall-clock source for the engine. Drift correction and suspension
/// reconciliation both compare against this clock, never against tick
/// counts, so tests can inject a controllable implementation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
