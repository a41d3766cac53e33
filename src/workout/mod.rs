pub mod config;
pub mod phases;

pub use config::{SavedWorkoutTemplate, Speed, SpeedUnit, WorkoutConfig};
pub use phases::{first_phase, next_phase, planned_sequence, PhaseKind};
