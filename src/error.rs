use thiserror::Error;

/// Engine-facing error taxonomy. Configuration problems surface before a
/// session starts; state errors are rejected synchronously with no partial
/// mutation. Persistence failures travel as `anyhow::Error` from the store
/// and never abort a session in progress.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid workout configuration: {0}")]
    Config(String),
    #[error("a session is already running")]
    SessionAlreadyRunning,
    #[error("no active session")]
    NoActiveSession,
    #[error("session is already paused")]
    AlreadyPaused,
    #[error("session is not paused")]
    NotPaused,
}
