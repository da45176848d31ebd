use thiserror::Error;

use super::state::{SessionEvent, SessionState};

/// Reasons a session setup is rejected before any I/O happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[error("devices and player names are required")]
    Missing,

    #[error("got {devices} devices but {names} player names")]
    CountMismatch { devices: usize, names: usize },

    #[error("a session needs between {min} and {max} devices, got {actual}")]
    DeviceCount { actual: usize, min: usize, max: usize },

    #[error("round duration must be between {min} and {max} seconds, got {actual}")]
    RoundDuration { actual: u32, min: u32, max: u32 },

    #[error("player name at position {position} is blank")]
    BlankName { position: usize },

    #[error("player name '{name}' is used more than once")]
    DuplicateName { name: String },

    #[error("device '{device}' is listed more than once")]
    DuplicateDevice { device: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session setup: {0}")]
    InvalidSetup(#[from] SetupError),

    #[error("devices offline: {}", .0.join(", "))]
    DevicesOffline(Vec<String>),

    #[error("session {0} not found")]
    NotFound(String),

    #[error("cannot {event} session {session_id} while it is {from}")]
    InvalidTransition {
        session_id: String,
        from: SessionState,
        event: SessionEvent,
    },

    #[error("player on device {device_number} is not part of session {session_id}")]
    UnknownPlayer {
        session_id: String,
        device_number: String,
    },

    #[error(transparent)]
    Dependency(#[from] anyhow::Error),
}

impl SessionError {
    /// True for failures caused by the caller rather than by the store.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SessionError::Dependency(_))
    }
}
