//! Game session records.
//!
//! State changes on these rows are driven exclusively by
//! [`crate::session::SessionController`].

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{db::helpers::unknown_value, session::SessionState};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub id: String,
    pub device_numbers: Vec<String>,
    pub player_names: Vec<String>,
    pub round_seconds: u32,
    pub state: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PlayerStatus {
    Ready,
    Playing,
    Completed,
}

impl PlayerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerStatus::Ready => "ready",
            PlayerStatus::Playing => "playing",
            PlayerStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "ready" => Ok(PlayerStatus::Ready),
            "playing" => Ok(PlayerStatus::Playing),
            "completed" => Ok(PlayerStatus::Completed),
            other => Err(unknown_value("player status", other)),
        }
    }

    /// Player status that goes with a session entering `state`.
    pub fn for_session(state: SessionState) -> Option<Self> {
        match state {
            SessionState::Pending => Some(PlayerStatus::Ready),
            SessionState::Active => Some(PlayerStatus::Playing),
            SessionState::Completed => Some(PlayerStatus::Completed),
            SessionState::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlayer {
    pub session_id: String,
    pub device_number: String,
    pub player_name: String,
    pub ok_presses: u32,
    pub wrong_presses: u32,
    pub no_presses: u32,
    pub avg_response_time: f64,
    /// `ok_presses - wrong_presses`.
    pub final_score: i64,
    pub status: PlayerStatus,
}

impl SessionPlayer {
    pub fn ready(session_id: &str, device_number: &str, player_name: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            device_number: device_number.to_string(),
            player_name: player_name.trim().to_string(),
            ok_presses: 0,
            wrong_presses: 0,
            no_presses: 0,
            avg_response_time: 0.0,
            final_score: 0,
            status: PlayerStatus::Ready,
        }
    }
}
