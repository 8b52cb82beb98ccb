//! Core error types.

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the tracking core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A timeline entry referenced a step number missing from the graph
    #[error("no step with number {0} in the process graph")]
    StepNotFound(u32),

    /// A preset name was not registered
    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    /// An operation referenced a user with no running session
    #[error("no active session for user: {0}")]
    NoActiveSession(String),
}
