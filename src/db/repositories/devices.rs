use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    db::{
        connection::Database,
        helpers::{parse_date, parse_datetime, parse_optional_datetime},
        models::{Device, DeviceScore, DeviceStatus, GameScoreReport},
    },
    protocol::{GameStatus, ScoreCounters},
};

const SCORE_COLUMNS: &str = "device_number, ok_presses, wrong_presses, no_presses,
     last_response_time, avg_response_time, game_status, updated_at";

const REPORT_COLUMNS: &str = "id, device_number, ok_presses, wrong_presses, no_presses,
     avg_response_time, success_rate, total_play_time, report_date, peak_hour, created_at";

fn row_to_device(row: &Row) -> Result<Device> {
    let status: String = row.get("status")?;
    let last_heartbeat_at: Option<String> = row.get("last_heartbeat_at")?;

    Ok(Device {
        device_number: row.get("device_number")?,
        name: row.get("name")?,
        status: DeviceStatus::parse(&status)?,
        last_heartbeat_at: parse_optional_datetime(last_heartbeat_at, "last_heartbeat_at")?,
    })
}

fn row_to_score(row: &Row) -> Result<DeviceScore> {
    let game_status: String = row.get("game_status")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(DeviceScore {
        device_number: row.get("device_number")?,
        counters: ScoreCounters {
            ok_presses: row.get("ok_presses")?,
            wrong_presses: row.get("wrong_presses")?,
            no_presses: row.get("no_presses")?,
            last_response_time: row.get("last_response_time")?,
            avg_response_time: row.get("avg_response_time")?,
        },
        game_status: GameStatus::from_token(&game_status),
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn row_to_report(row: &Row) -> Result<GameScoreReport> {
    let report_date: String = row.get("report_date")?;
    let created_at: String = row.get("created_at")?;

    Ok(GameScoreReport {
        id: row.get("id")?,
        device_number: row.get("device_number")?,
        counters: ScoreCounters {
            ok_presses: row.get("ok_presses")?,
            wrong_presses: row.get("wrong_presses")?,
            no_presses: row.get("no_presses")?,
            last_response_time: 0.0,
            avg_response_time: row.get("avg_response_time")?,
        },
        success_rate: row.get("success_rate")?,
        total_play_time: row.get("total_play_time")?,
        report_date: parse_date(&report_date, "report_date")?,
        peak_hour: row.get("peak_hour")?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn upsert_score(conn: &Connection, score: &DeviceScore) -> rusqlite::Result<usize> {
    let counters = &score.counters;
    conn.execute(
        "INSERT INTO device_scores (device_number, ok_presses, wrong_presses, no_presses,
                                    last_response_time, avg_response_time, game_status, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(device_number) DO UPDATE SET
             ok_presses = excluded.ok_presses,
             wrong_presses = excluded.wrong_presses,
             no_presses = excluded.no_presses,
             last_response_time = excluded.last_response_time,
             avg_response_time = excluded.avg_response_time,
             game_status = excluded.game_status,
             updated_at = excluded.updated_at",
        params![
            score.device_number,
            counters.ok_presses,
            counters.wrong_presses,
            counters.no_presses,
            counters.last_response_time,
            counters.avg_response_time,
            score.game_status.as_str(),
            score.updated_at.to_rfc3339(),
        ],
    )
}

impl Database {
    pub async fn register_device(&self, device_number: &str, name: &str) -> Result<()> {
        let device_number = device_number.to_string();
        let name = name.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO devices (device_number, name, status, last_heartbeat_at)
                 VALUES (?1, ?2, ?3, NULL)",
                params![device_number, name, DeviceStatus::Active.as_str()],
            )
            .with_context(|| format!("failed to register device {device_number}"))?;
            Ok(())
        })
        .await
    }

    pub async fn set_device_status(&self, device_number: &str, status: DeviceStatus) -> Result<bool> {
        let device_number = device_number.to_string();
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE devices SET status = ?1 WHERE device_number = ?2",
                params![status.as_str(), device_number],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    pub async fn get_device(&self, device_number: &str) -> Result<Option<Device>> {
        let device_number = device_number.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT device_number, name, status, last_heartbeat_at
                 FROM devices
                 WHERE device_number = ?1",
            )?;
            let mut rows = stmt.query(params![device_number])?;
            let device = match rows.next()? {
                Some(row) => Some(row_to_device(row)?),
                None => None,
            };
            Ok(device)
        })
        .await
    }

    /// Stamps the device's last heartbeat. Unknown devices are left alone and
    /// reported as `false`.
    pub async fn touch_heartbeat(&self, device_number: &str, at: DateTime<Utc>) -> Result<bool> {
        let device_number = device_number.to_string();
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE devices SET last_heartbeat_at = ?1 WHERE device_number = ?2",
                params![at.to_rfc3339(), device_number],
            )?;
            Ok(updated > 0)
        })
        .await
    }

    /// Devices among `device_numbers` that are `active` and have a heartbeat
    /// at or after `since`.
    pub async fn online_devices(
        &self,
        device_numbers: &[String],
        since: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let wanted = device_numbers.to_vec();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT device_number, name, status, last_heartbeat_at
                 FROM devices
                 WHERE device_number = ?1",
            )?;

            let mut online = Vec::new();
            for device_number in &wanted {
                let mut rows = stmt.query(params![device_number])?;
                if let Some(row) = rows.next()? {
                    let device = row_to_device(row)?;
                    let fresh = device
                        .last_heartbeat_at
                        .map(|seen| seen >= since)
                        .unwrap_or(false);
                    if device.status == DeviceStatus::Active && fresh {
                        online.push(device.device_number);
                    }
                }
            }

            Ok(online)
        })
        .await
    }

    pub async fn get_device_score(&self, device_number: &str) -> Result<Option<DeviceScore>> {
        let device_number = device_number.to_string();
        self.execute(move |conn| {
            let query = format!("SELECT {SCORE_COLUMNS} FROM device_scores WHERE device_number = ?1");
            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params![device_number])?;
            let score = match rows.next()? {
                Some(row) => Some(row_to_score(row)?),
                None => None,
            };
            Ok(score)
        })
        .await
    }

    /// Overwrites the five counters, creating the row with an empty game
    /// status if the device has none yet.
    pub async fn overwrite_device_counters(
        &self,
        device_number: &str,
        counters: ScoreCounters,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let device_number = device_number.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO device_scores (device_number, ok_presses, wrong_presses, no_presses,
                                            last_response_time, avg_response_time, game_status, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, '', ?7)
                 ON CONFLICT(device_number) DO UPDATE SET
                     ok_presses = excluded.ok_presses,
                     wrong_presses = excluded.wrong_presses,
                     no_presses = excluded.no_presses,
                     last_response_time = excluded.last_response_time,
                     avg_response_time = excluded.avg_response_time,
                     updated_at = excluded.updated_at",
                params![
                    device_number,
                    counters.ok_presses,
                    counters.wrong_presses,
                    counters.no_presses,
                    counters.last_response_time,
                    counters.avg_response_time,
                    at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to store counters for device {device_number}"))?;
            Ok(())
        })
        .await
    }

    /// Persists a game-status change and, when given, the completion report
    /// that goes with it. Both land or neither does.
    pub async fn save_game_status(
        &self,
        score: &DeviceScore,
        report: Option<GameScoreReport>,
    ) -> Result<Option<GameScoreReport>> {
        let record = score.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            let stored_report = match report {
                Some(mut report) => {
                    let counters = &report.counters;
                    tx.execute(
                        "INSERT INTO game_score_reports (device_number, ok_presses, wrong_presses, no_presses,
                                                         avg_response_time, success_rate, total_play_time,
                                                         report_date, peak_hour, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                        params![
                            report.device_number,
                            counters.ok_presses,
                            counters.wrong_presses,
                            counters.no_presses,
                            counters.avg_response_time,
                            report.success_rate,
                            report.total_play_time,
                            report.report_date.format("%Y-%m-%d").to_string(),
                            report.peak_hour,
                            report.created_at.to_rfc3339(),
                        ],
                    )
                    .context("failed to insert completion report")?;
                    report.id = tx.last_insert_rowid();
                    Some(report)
                }
                None => None,
            };

            upsert_score(&tx, &record)
                .with_context(|| format!("failed to save game status for {}", record.device_number))?;

            tx.commit().context("failed to commit game status")?;
            Ok(stored_report)
        })
        .await
    }

    pub async fn reports_for_device(&self, device_number: &str) -> Result<Vec<GameScoreReport>> {
        let device_number = device_number.to_string();
        self.execute(move |conn| {
            let query = format!(
                "SELECT {REPORT_COLUMNS} FROM game_score_reports WHERE device_number = ?1 ORDER BY id ASC"
            );
            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params![device_number])?;
            let mut reports = Vec::new();
            while let Some(row) = rows.next()? {
                reports.push(row_to_report(row)?);
            }
            Ok(reports)
        })
        .await
    }

    pub async fn get_report(&self, report_id: i64) -> Result<Option<GameScoreReport>> {
        self.execute(move |conn| {
            let query = format!("SELECT {REPORT_COLUMNS} FROM game_score_reports WHERE id = ?1");
            let report = conn
                .query_row(&query, params![report_id], |row| Ok(row_to_report(row)))
                .optional()?
                .transpose()?;
            Ok(report)
        })
        .await
    }
}
