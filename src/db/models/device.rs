//! Device registry, live score state and completion reports.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::helpers::unknown_value,
    protocol::{GameStatus, ScoreCounters},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DeviceStatus {
    Active,
    Inactive,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "active" => Ok(DeviceStatus::Active),
            "inactive" => Ok(DeviceStatus::Inactive),
            other => Err(unknown_value("device status", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_number: String,
    pub name: String,
    pub status: DeviceStatus,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceScore {
    pub device_number: String,
    pub counters: ScoreCounters,
    pub game_status: GameStatus,
    pub updated_at: DateTime<Utc>,
}

/// Snapshot written once per STOP transition. Never updated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameScoreReport {
    pub id: i64,
    pub device_number: String,
    pub counters: ScoreCounters,
    /// Percentage of ok presses; 0 when nothing was pressed.
    pub success_rate: f64,
    /// Minutes of play derived from the average response time.
    pub total_play_time: f64,
    pub report_date: NaiveDate,
    pub peak_hour: u32,
    pub created_at: DateTime<Utc>,
}
