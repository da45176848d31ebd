use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row, Transaction};

use crate::{
    db::{
        connection::Database,
        helpers::{decode_list, encode_list, parse_datetime, parse_optional_datetime},
        models::{GameSession, PlayerStatus, SessionPlayer},
    },
    session::SessionState,
};

const SESSION_COLUMNS: &str = "id, device_numbers, player_names, round_seconds, state,
     started_at, ended_at, created_by, created_at, updated_at";

const PLAYER_COLUMNS: &str = "session_id, device_number, player_name, ok_presses, wrong_presses,
     no_presses, avg_response_time, final_score, status";

fn row_to_session(row: &Row) -> Result<GameSession> {
    let device_numbers: String = row.get("device_numbers")?;
    let player_names: String = row.get("player_names")?;
    let state: String = row.get("state")?;
    let started_at: Option<String> = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(GameSession {
        id: row.get("id")?,
        device_numbers: decode_list(&device_numbers, "device_numbers")?,
        player_names: decode_list(&player_names, "player_names")?,
        round_seconds: row.get("round_seconds")?,
        state: SessionState::parse(&state)?,
        started_at: parse_optional_datetime(started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        created_by: row.get("created_by")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn row_to_player(row: &Row) -> Result<SessionPlayer> {
    let status: String = row.get("status")?;

    Ok(SessionPlayer {
        session_id: row.get("session_id")?,
        device_number: row.get("device_number")?,
        player_name: row.get("player_name")?,
        ok_presses: row.get("ok_presses")?,
        wrong_presses: row.get("wrong_presses")?,
        no_presses: row.get("no_presses")?,
        avg_response_time: row.get("avg_response_time")?,
        final_score: row.get("final_score")?,
        status: PlayerStatus::parse(&status)?,
    })
}

fn insert_players(tx: &Transaction<'_>, players: &[SessionPlayer]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO game_session_players (session_id, device_number, player_name, ok_presses,
                                           wrong_presses, no_presses, avg_response_time,
                                           final_score, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    for player in players {
        stmt.execute(params![
            player.session_id,
            player.device_number,
            player.player_name,
            player.ok_presses,
            player.wrong_presses,
            player.no_presses,
            player.avg_response_time,
            player.final_score,
            player.status.as_str(),
        ])
        .with_context(|| {
            format!(
                "failed to insert player for device {} in session {}",
                player.device_number, player.session_id
            )
        })?;
    }
    Ok(())
}

/// What a conditional state write should stamp besides the state itself.
#[derive(Debug, Clone, Copy)]
pub struct StateWrite {
    pub from: SessionState,
    pub to: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

impl Database {
    pub async fn insert_game_session(
        &self,
        session: &GameSession,
        players: Vec<SessionPlayer>,
    ) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO game_sessions (id, device_numbers, player_names, round_seconds, state,
                                            started_at, ended_at, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    encode_list(&record.device_numbers)?,
                    encode_list(&record.player_names)?,
                    record.round_seconds,
                    record.state.as_str(),
                    record.started_at.map(|dt| dt.to_rfc3339()),
                    record.ended_at.map(|dt| dt.to_rfc3339()),
                    record.created_by,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to insert session {}", record.id))?;
            insert_players(&tx, &players)?;
            tx.commit().context("failed to commit new session")?;
            Ok(())
        })
        .await
    }

    pub async fn get_game_session(&self, session_id: &str) -> Result<Option<GameSession>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let query = format!("SELECT {SESSION_COLUMNS} FROM game_sessions WHERE id = ?1");
            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params![session_id])?;
            let session = match rows.next()? {
                Some(row) => Some(row_to_session(row)?),
                None => None,
            };
            Ok(session)
        })
        .await
    }

    pub async fn list_sessions_by_state(&self, state: SessionState) -> Result<Vec<GameSession>> {
        self.execute(move |conn| {
            let query = format!(
                "SELECT {SESSION_COLUMNS} FROM game_sessions WHERE state = ?1 ORDER BY created_at ASC"
            );
            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params![state.as_str()])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Replaces the setup of a still-pending session and all of its player
    /// rows. Returns false without writing when the session is not pending.
    pub async fn replace_session_setup(
        &self,
        session: &GameSession,
        players: Vec<SessionPlayer>,
    ) -> Result<bool> {
        let record = session.clone();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE game_sessions
                 SET device_numbers = ?1,
                     player_names = ?2,
                     round_seconds = ?3,
                     updated_at = ?4
                 WHERE id = ?5 AND state = ?6",
                params![
                    encode_list(&record.device_numbers)?,
                    encode_list(&record.player_names)?,
                    record.round_seconds,
                    record.updated_at.to_rfc3339(),
                    record.id,
                    SessionState::Pending.as_str(),
                ],
            )?;
            if updated == 0 {
                return Ok(false);
            }

            tx.execute(
                "DELETE FROM game_session_players WHERE session_id = ?1",
                params![record.id],
            )?;
            insert_players(&tx, &players)?;
            tx.commit().context("failed to commit session update")?;
            Ok(true)
        })
        .await
    }

    /// Moves a session from `write.from` to `write.to` only if it is still in
    /// `write.from`, updating player statuses in the same transaction.
    /// Returns false when another caller already moved it.
    pub async fn transition_session(&self, session_id: &str, write: StateWrite) -> Result<bool> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE game_sessions
                 SET state = ?1,
                     started_at = COALESCE(?2, started_at),
                     ended_at = COALESCE(?3, ended_at),
                     updated_at = ?4
                 WHERE id = ?5 AND state = ?6",
                params![
                    write.to.as_str(),
                    write.started_at.map(|dt| dt.to_rfc3339()),
                    write.ended_at.map(|dt| dt.to_rfc3339()),
                    write.at.to_rfc3339(),
                    session_id,
                    write.from.as_str(),
                ],
            )?;
            if updated == 0 {
                return Ok(false);
            }

            if let Some(player_status) = PlayerStatus::for_session(write.to) {
                tx.execute(
                    "UPDATE game_session_players SET status = ?1 WHERE session_id = ?2",
                    params![player_status.as_str(), session_id],
                )?;
            }

            tx.commit()
                .with_context(|| format!("failed to move session {session_id} to {}", write.to))?;
            Ok(true)
        })
        .await
    }

    pub async fn get_session_players(&self, session_id: &str) -> Result<Vec<SessionPlayer>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let query = format!(
                "SELECT {PLAYER_COLUMNS} FROM game_session_players WHERE session_id = ?1 ORDER BY rowid ASC"
            );
            let mut stmt = conn.prepare(&query)?;
            let mut rows = stmt.query(params![session_id])?;
            let mut players = Vec::new();
            while let Some(row) = rows.next()? {
                players.push(row_to_player(row)?);
            }
            Ok(players)
        })
        .await
    }

    /// Overwrites a player's counters and recomputes the final score.
    /// Returns false when the player row does not exist.
    pub async fn update_player_score(
        &self,
        session_id: &str,
        device_number: &str,
        ok_presses: u32,
        wrong_presses: u32,
        no_presses: u32,
        avg_response_time: f64,
    ) -> Result<bool> {
        let session_id = session_id.to_string();
        let device_number = device_number.to_string();
        self.execute(move |conn| {
            let final_score = i64::from(ok_presses) - i64::from(wrong_presses);
            let updated = conn.execute(
                "UPDATE game_session_players
                 SET ok_presses = ?1,
                     wrong_presses = ?2,
                     no_presses = ?3,
                     avg_response_time = ?4,
                     final_score = ?5
                 WHERE session_id = ?6 AND device_number = ?7",
                params![
                    ok_presses,
                    wrong_presses,
                    no_presses,
                    avg_response_time,
                    final_score,
                    session_id,
                    device_number,
                ],
            )?;
            Ok(updated > 0)
        })
        .await
    }
}
