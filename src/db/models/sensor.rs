//! Sensor-side records: clients, their sensors and the transition log.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::helpers::unknown_value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensorStatus {
    Active,
    Inactive,
    Bad,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Active => "ACTIVE",
            SensorStatus::Inactive => "INACTIVE",
            SensorStatus::Bad => "BAD",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "ACTIVE" => Ok(SensorStatus::Active),
            "INACTIVE" => Ok(SensorStatus::Inactive),
            "BAD" => Ok(SensorStatus::Bad),
            other => Err(unknown_value("sensor status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Open,
    Close,
    Bad,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Open => "OPEN",
            TransactionKind::Close => "CLOSE",
            TransactionKind::Bad => "BAD",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "OPEN" => Ok(TransactionKind::Open),
            "CLOSE" => Ok(TransactionKind::Close),
            "BAD" => Ok(TransactionKind::Bad),
            other => Err(unknown_value("transaction kind", other)),
        }
    }
}

impl From<SensorStatus> for TransactionKind {
    fn from(status: SensorStatus) -> Self {
        match status {
            SensorStatus::Active => TransactionKind::Open,
            SensorStatus::Inactive => TransactionKind::Close,
            SensorStatus::Bad => TransactionKind::Bad,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    pub serial: String,
    pub client_id: String,
    pub status: SensorStatus,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub description: String,
}

/// A pending status write for one sensor, computed against pre-batch state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorStatusChange {
    pub serial: String,
    pub status: SensorStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SensorTransaction {
    pub id: i64,
    pub serial: String,
    pub kind: TransactionKind,
    pub occurred_at: DateTime<Utc>,
}
