use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::db::helpers::unknown_value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Pending
    }
}

/// Everything that may move a session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Replace devices, names or duration.
    Reconfigure,
    Start,
    /// Manual end or round expiry; both producers share this one event.
    Complete,
    Cancel,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Pending => "pending",
            SessionState::Active => "active",
            SessionState::Completed => "completed",
            SessionState::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(SessionState::Pending),
            "active" => Ok(SessionState::Active),
            "completed" => Ok(SessionState::Completed),
            "cancelled" => Ok(SessionState::Cancelled),
            other => Err(unknown_value("session state", other)),
        }
    }

    /// Transition table. `None` means the event is not allowed from `self`.
    pub fn next(self, event: SessionEvent) -> Option<SessionState> {
        match (self, event) {
            (SessionState::Pending, SessionEvent::Reconfigure) => Some(SessionState::Pending),
            (SessionState::Pending, SessionEvent::Start) => Some(SessionState::Active),
            (SessionState::Pending, SessionEvent::Cancel) => Some(SessionState::Cancelled),
            (SessionState::Active, SessionEvent::Complete) => Some(SessionState::Completed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEvent::Reconfigure => "update",
            SessionEvent::Start => "start",
            SessionEvent::Complete => "end",
            SessionEvent::Cancel => "cancel",
        };
        f.write_str(name)
    }
}
