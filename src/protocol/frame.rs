use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SENSOR_BATCH_FIELDS: usize = 17;
const SCORE_UPDATE_FIELDS: usize = 9;
const GAME_STATUS_FIELDS: usize = 3;
const STATUS_MARKER: &str = "Status";
const FIRST_SENSOR_CODE: usize = 2;

const FRAME_MARKERS: [char; 2] = ['*', '#'];

/// Game status token reported by a device. Anything other than START/STOP is
/// kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    Start,
    Stop,
    Other(String),
}

impl GameStatus {
    pub fn from_token(token: &str) -> Self {
        match token {
            "START" => GameStatus::Start,
            "STOP" => GameStatus::Stop,
            other => GameStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GameStatus::Start => "START",
            GameStatus::Stop => "STOP",
            GameStatus::Other(token) => token,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live counters a device reports for the current round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCounters {
    pub ok_presses: u32,
    pub wrong_presses: u32,
    pub no_presses: u32,
    pub last_response_time: f64,
    pub avg_response_time: f64,
}

impl ScoreCounters {
    /// Widened so counts near `u32::MAX` cannot overflow.
    pub fn total_presses(&self) -> u64 {
        u64::from(self.ok_presses) + u64::from(self.wrong_presses) + u64::from(self.no_presses)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    /// One status code per sensor position of a client, in order.
    SensorBatch { client_id: String, codes: Vec<String> },
    DeviceScore {
        device_number: String,
        counters: ScoreCounters,
    },
    DeviceGameStatus {
        device_number: String,
        status: GameStatus,
    },
    /// Any other shape: only proves the device named in field 0 is alive.
    Heartbeat { device_number: String },
}

impl TelemetryMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryMessage::SensorBatch { .. } => "sensor-batch",
            TelemetryMessage::DeviceScore { .. } => "device-score",
            TelemetryMessage::DeviceGameStatus { .. } => "device-game-status",
            TelemetryMessage::Heartbeat { .. } => "heartbeat",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame is empty after stripping markers")]
    Empty,

    #[error("frame has no identifier in field 0")]
    MissingIdentifier,

    #[error("field {field} is not a valid number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

/// Strips `*`/`#` markers and surrounding whitespace.
pub fn clean_frame(raw: &str) -> String {
    raw.chars()
        .filter(|c| !FRAME_MARKERS.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Identifier in field 0: the client id of a sensor batch or the device
/// number of every other shape. `None` for frames `classify` would reject.
pub fn frame_key(raw: &str) -> Option<String> {
    let cleaned = clean_frame(raw);
    let identifier = cleaned.split(',').next()?.trim();
    (!identifier.is_empty()).then(|| identifier.to_string())
}

pub fn classify(raw: &str) -> Result<TelemetryMessage, FrameError> {
    let cleaned = clean_frame(raw);
    if cleaned.is_empty() {
        return Err(FrameError::Empty);
    }

    let fields: Vec<&str> = cleaned.split(',').map(str::trim).collect();
    let identifier = fields[0];
    if identifier.is_empty() {
        return Err(FrameError::MissingIdentifier);
    }

    let message = match fields.len() {
        SENSOR_BATCH_FIELDS => TelemetryMessage::SensorBatch {
            client_id: identifier.to_string(),
            codes: fields[FIRST_SENSOR_CODE..]
                .iter()
                .map(|code| code.to_string())
                .collect(),
        },
        SCORE_UPDATE_FIELDS if fields[1] == STATUS_MARKER => TelemetryMessage::DeviceScore {
            device_number: identifier.to_string(),
            counters: ScoreCounters {
                ok_presses: parse_count("ok_presses", fields[4])?,
                wrong_presses: parse_count("wrong_presses", fields[5])?,
                no_presses: parse_count("no_presses", fields[6])?,
                last_response_time: parse_time("last_response_time", fields[7])?,
                avg_response_time: parse_time("avg_response_time", fields[8])?,
            },
        },
        GAME_STATUS_FIELDS if fields[1] == STATUS_MARKER => TelemetryMessage::DeviceGameStatus {
            device_number: identifier.to_string(),
            status: GameStatus::from_token(fields[2]),
        },
        _ => TelemetryMessage::Heartbeat {
            device_number: identifier.to_string(),
        },
    };

    Ok(message)
}

fn parse_count(field: &'static str, value: &str) -> Result<u32, FrameError> {
    value.parse().map_err(|_| FrameError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_time(field: &'static str, value: &str) -> Result<f64, FrameError> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => Ok(parsed),
        _ => Err(FrameError::InvalidNumber {
            field,
            value: value.to_string(),
        }),
    }
}
