use thiserror::Error;

/// Reasons a command is refused at the boundary. The router turns every one of
/// these into `{ "success": false }`; none of them touch state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("timer duration must be a positive number of seconds, got {0}")]
    InvalidDuration(i64),
    #[error("site must not be empty")]
    EmptySite,
    #[error("note must not be empty")]
    EmptyNote,
    #[error("malformed message: {0}")]
    Malformed(String),
}
