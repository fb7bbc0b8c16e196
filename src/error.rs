// src/error.rs
//! Error types for the activity recorder

use crate::session::{SessionState, Transition};
use std::fmt;

pub type Result<T> = std::result::Result<T, RecorderError>;

#[derive(Debug)]
pub enum RecorderError {
    /// Location permission was not granted by the host.
    PermissionDenied,
    /// A one-shot position request produced no fix in time.
    LocationUnavailable,
    /// A session transition was requested from a state that does not allow it.
    InvalidStateTransition {
        from: SessionState,
        action: Transition,
    },
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    Api { status: u16, message: String },
    Connection(String),
    Parse(String),
    Config(String),
    Other(String),
}

impl RecorderError {
    /// Errors the UI should present as "tracking unavailable" rather than a failure.
    pub fn is_location_unavailable(&self) -> bool {
        matches!(self, RecorderError::PermissionDenied | RecorderError::LocationUnavailable)
    }
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecorderError::PermissionDenied => write!(f, "Location permission denied"),
            RecorderError::LocationUnavailable => write!(f, "Location unavailable"),
            RecorderError::InvalidStateTransition { from, action } => {
                write!(f, "Invalid state transition: cannot {} while {}", action, from)
            }
            RecorderError::Io(e) => write!(f, "IO error: {}", e),
            RecorderError::Serial(e) => write!(f, "Serial error: {}", e),
            RecorderError::Json(e) => write!(f, "JSON error: {}", e),
            RecorderError::Http(e) => write!(f, "HTTP error: {}", e),
            RecorderError::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            RecorderError::Connection(msg) => write!(f, "Connection error: {}", msg),
            RecorderError::Parse(msg) => write!(f, "Parse error: {}", msg),
            RecorderError::Config(msg) => write!(f, "Config error: {}", msg),
            RecorderError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for RecorderError {}

impl From<std::io::Error> for RecorderError {
    fn from(error: std::io::Error) -> Self {
        RecorderError::Io(error)
    }
}

impl From<tokio_serial::Error> for RecorderError {
    fn from(error: tokio_serial::Error) -> Self {
        RecorderError::Serial(error)
    }
}

impl From<serde_json::Error> for RecorderError {
    fn from(error: serde_json::Error) -> Self {
        RecorderError::Json(error)
    }
}

impl From<reqwest::Error> for RecorderError {
    fn from(error: reqwest::Error) -> Self {
        RecorderError::Http(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_permission_error_is_not_a_location_problem() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "EACCES");
        let err = RecorderError::from(io);
        assert!(matches!(err, RecorderError::Io(_)));
        assert!(!err.is_location_unavailable());

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(RecorderError::from(io), RecorderError::Io(_)));
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = RecorderError::InvalidStateTransition {
            from: SessionState::Idle,
            action: Transition::Pause,
        };
        assert_eq!(err.to_string(), "Invalid state transition: cannot pause while idle");
        assert!(!err.is_location_unavailable());
        assert!(RecorderError::PermissionDenied.is_location_unavailable());
    }
}
