use std::{cmp::Ordering, sync::Arc};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    db::{Database, GameSession, SessionPlayer, StateWrite},
    keyed_lock::KeyedLock,
    protocol::DeviceCommand,
    transport::CommandPublisher,
};

use super::{
    error::SessionError,
    state::{SessionEvent, SessionState},
    timers::SessionTimers,
    validation::validate_setup,
};

/// Devices, names and duration proposed for a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub devices: Vec<String>,
    pub player_names: Vec<String>,
    pub round_seconds: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub session_id: String,
    pub state: SessionState,
    pub round_seconds: u32,
    pub time_remaining_secs: u32,
    /// Ordered by player name.
    pub players: Vec<SessionPlayer>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResults {
    pub session: GameSession,
    /// Ordered by final score, best first; ties by name.
    pub players: Vec<SessionPlayer>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySummary {
    pub completed: usize,
    pub rearmed: usize,
}

pub fn time_remaining(session: &GameSession, now: DateTime<Utc>) -> u32 {
    match (session.state, session.started_at) {
        (SessionState::Active, Some(started_at)) => {
            let elapsed = (now - started_at).num_seconds().max(0);
            (i64::from(session.round_seconds) - elapsed).max(0) as u32
        }
        _ => 0,
    }
}

fn by_name(a: &SessionPlayer, b: &SessionPlayer) -> Ordering {
    a.player_name
        .to_lowercase()
        .cmp(&b.player_name.to_lowercase())
        .then_with(|| a.player_name.cmp(&b.player_name))
}

fn by_score_then_name(a: &SessionPlayer, b: &SessionPlayer) -> Ordering {
    b.final_score.cmp(&a.final_score).then_with(|| by_name(a, b))
}

fn trimmed(values: &[String]) -> Vec<String> {
    values.iter().map(|value| value.trim().to_string()).collect()
}

/// Owns every game-session state change. Cheap to clone; clones share the
/// same timers and locks.
#[derive(Clone)]
pub struct SessionController {
    db: Database,
    publisher: Arc<dyn CommandPublisher>,
    timers: SessionTimers,
    locks: KeyedLock,
    liveness_window: chrono::Duration,
}

impl SessionController {
    pub fn new(
        db: Database,
        publisher: Arc<dyn CommandPublisher>,
        timers: SessionTimers,
        liveness_window: chrono::Duration,
    ) -> Self {
        Self {
            db,
            publisher,
            timers,
            locks: KeyedLock::new(),
            liveness_window,
        }
    }

    pub fn timers(&self) -> &SessionTimers {
        &self.timers
    }

    pub async fn get_session(&self, session_id: &str) -> Result<GameSession, SessionError> {
        self.db
            .get_game_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    pub async fn create(
        &self,
        setup: SessionSetup,
        created_by: &str,
    ) -> Result<GameSession, SessionError> {
        let setup = self.check_setup(setup).await?;

        let now = Utc::now();
        let session = GameSession {
            id: Uuid::new_v4().to_string(),
            device_numbers: setup.devices,
            player_names: setup.player_names,
            round_seconds: setup.round_seconds,
            state: SessionState::Pending,
            started_at: None,
            ended_at: None,
            created_by: created_by.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.db
            .insert_game_session(&session, ready_players(&session))
            .await?;

        info!(
            "Created session {} for devices [{}] by {created_by}",
            session.id,
            session.device_numbers.join(", ")
        );
        Ok(session)
    }

    /// Replaces the setup of a pending session, including every player row.
    pub async fn update(
        &self,
        session_id: &str,
        setup: SessionSetup,
    ) -> Result<GameSession, SessionError> {
        let _guard = self.locks.lock(session_id).await;
        let mut session = self.get_session(session_id).await?;
        require(&session, SessionEvent::Reconfigure)?;

        let setup = self.check_setup(setup).await?;
        session.device_numbers = setup.devices;
        session.player_names = setup.player_names;
        session.round_seconds = setup.round_seconds;
        session.updated_at = Utc::now();

        if !self
            .db
            .replace_session_setup(&session, ready_players(&session))
            .await?
        {
            return Err(self.stale_transition(session_id, SessionEvent::Reconfigure).await);
        }

        self.timers.disarm(session_id);
        info!("Updated setup of session {session_id}");
        Ok(session)
    }

    /// Activates a pending session, arms its round timer and tells every
    /// device the round length and then to start.
    pub async fn start(&self, session_id: &str) -> Result<GameSession, SessionError> {
        let _guard = self.locks.lock(session_id).await;
        let session = self.get_session(session_id).await?;
        let next = require(&session, SessionEvent::Start)?;

        let now = Utc::now();
        let moved = self
            .db
            .transition_session(
                session_id,
                StateWrite {
                    from: session.state,
                    to: next,
                    started_at: Some(now),
                    ended_at: None,
                    at: now,
                },
            )
            .await?;
        if !moved {
            return Err(self.stale_transition(session_id, SessionEvent::Start).await);
        }
        info!("Session {session_id}: {} -> {next}", session.state);

        self.arm_round_timer(session_id, session.round_seconds);

        for device_number in &session.device_numbers {
            for command in [
                DeviceCommand::SetRoundDuration(session.round_seconds),
                DeviceCommand::Start,
            ] {
                if let Err(err) = self.publisher.publish(device_number, command) {
                    error!(
                        "Failed to publish {command} to device {device_number} for session {session_id}: {err:?}"
                    );
                }
            }
        }

        self.get_session(session_id).await
    }

    /// Manually ends an active session.
    pub async fn end(&self, session_id: &str) -> Result<GameSession, SessionError> {
        let session = {
            let _guard = self.locks.lock(session_id).await;
            let session = self.get_session(session_id).await?;
            require(&session, SessionEvent::Complete)?;
            if !self.complete_locked(&session).await? {
                return Err(self.stale_transition(session_id, SessionEvent::Complete).await);
            }
            self.get_session(session_id).await?
        };

        self.timers.disarm(session_id);
        Ok(session)
    }

    /// Round-expiry path. Re-reads the session and completes it only if it is
    /// still active; returns whether it did.
    pub async fn complete_if_active(&self, session_id: &str) -> Result<bool, SessionError> {
        let _guard = self.locks.lock(session_id).await;
        let Some(session) = self.db.get_game_session(session_id).await? else {
            warn!("Round timer fired for unknown session {session_id}");
            return Ok(false);
        };

        if session.state.next(SessionEvent::Complete).is_none() {
            info!(
                "Round timer for session {session_id} found it {}; nothing to do",
                session.state
            );
            return Ok(false);
        }

        self.complete_locked(&session).await
    }

    pub async fn cancel(&self, session_id: &str) -> Result<GameSession, SessionError> {
        let session = {
            let _guard = self.locks.lock(session_id).await;
            let session = self.get_session(session_id).await?;
            let next = require(&session, SessionEvent::Cancel)?;

            let now = Utc::now();
            let moved = self
                .db
                .transition_session(
                    session_id,
                    StateWrite {
                        from: session.state,
                        to: next,
                        started_at: None,
                        ended_at: None,
                        at: now,
                    },
                )
                .await?;
            if !moved {
                return Err(self.stale_transition(session_id, SessionEvent::Cancel).await);
            }
            info!("Session {session_id}: {} -> {next}", session.state);
            self.get_session(session_id).await?
        };

        self.timers.disarm(session_id);
        Ok(session)
    }

    /// Overwrites one player's counters. Allowed in any session state.
    pub async fn record_player_score(
        &self,
        session_id: &str,
        device_number: &str,
        ok_presses: u32,
        wrong_presses: u32,
        no_presses: u32,
        avg_response_time: f64,
    ) -> Result<(), SessionError> {
        self.get_session(session_id).await?;

        let updated = self
            .db
            .update_player_score(
                session_id,
                device_number,
                ok_presses,
                wrong_presses,
                no_presses,
                avg_response_time,
            )
            .await?;

        if !updated {
            return Err(SessionError::UnknownPlayer {
                session_id: session_id.to_string(),
                device_number: device_number.to_string(),
            });
        }
        Ok(())
    }

    pub async fn progress(&self, session_id: &str) -> Result<SessionProgress, SessionError> {
        let session = self.get_session(session_id).await?;
        let mut players = self.db.get_session_players(session_id).await?;
        players.sort_by(by_name);

        Ok(SessionProgress {
            time_remaining_secs: time_remaining(&session, Utc::now()),
            session_id: session.id,
            state: session.state,
            round_seconds: session.round_seconds,
            players,
        })
    }

    pub async fn results(&self, session_id: &str) -> Result<SessionResults, SessionError> {
        let session = self.get_session(session_id).await?;
        let mut players = self.db.get_session_players(session_id).await?;
        players.sort_by(by_score_then_name);
        Ok(SessionResults { session, players })
    }

    /// Completes active sessions whose round already elapsed and re-arms
    /// timers for the rest. Run once at start-up, before timers are needed.
    pub async fn recover_active_sessions(&self) -> Result<RecoverySummary, SessionError> {
        let now = Utc::now();
        let mut summary = RecoverySummary::default();

        for session in self.db.list_sessions_by_state(SessionState::Active).await? {
            let remaining = time_remaining(&session, now);
            if remaining == 0 {
                warn!(
                    "Recovered session {} past its deadline; completing it",
                    session.id
                );
                if self.complete_if_active(&session.id).await? {
                    summary.completed += 1;
                }
            } else {
                info!(
                    "Recovered session {} with {remaining}s left; re-arming timer",
                    session.id
                );
                self.arm_round_timer(&session.id, remaining);
                summary.rearmed += 1;
            }
        }

        Ok(summary)
    }

    fn arm_round_timer(&self, session_id: &str, seconds: u32) {
        let controller = self.clone();
        let id = session_id.to_string();
        self.timers.arm(session_id, seconds, move || async move {
            match controller.complete_if_active(&id).await {
                Ok(true) => info!("Session {id} completed by round timer"),
                Ok(false) => {}
                Err(err) => error!("Round timer failed to complete session {id}: {err}"),
            }
        });
    }

    /// Caller must hold the session's lock and have checked the transition.
    async fn complete_locked(&self, session: &GameSession) -> Result<bool, SessionError> {
        let now = Utc::now();
        let moved = self
            .db
            .transition_session(
                &session.id,
                StateWrite {
                    from: SessionState::Active,
                    to: SessionState::Completed,
                    started_at: None,
                    ended_at: Some(now),
                    at: now,
                },
            )
            .await?;

        if moved {
            info!("Session {}: {} -> {}", session.id, session.state, SessionState::Completed);
        }
        Ok(moved)
    }

    async fn check_setup(&self, setup: SessionSetup) -> Result<SessionSetup, SessionError> {
        let setup = SessionSetup {
            devices: trimmed(&setup.devices),
            player_names: trimmed(&setup.player_names),
            round_seconds: setup.round_seconds,
        };
        validate_setup(&setup.devices, &setup.player_names, setup.round_seconds)?;

        let since = Utc::now() - self.liveness_window;
        let online = self.db.online_devices(&setup.devices, since).await?;
        let offline: Vec<String> = setup
            .devices
            .iter()
            .filter(|device| !online.contains(*device))
            .cloned()
            .collect();
        if !offline.is_empty() {
            return Err(SessionError::DevicesOffline(offline));
        }

        Ok(setup)
    }

    /// Builds the error for a conditional write that lost a race.
    async fn stale_transition(&self, session_id: &str, event: SessionEvent) -> SessionError {
        match self.get_session(session_id).await {
            Ok(current) => SessionError::InvalidTransition {
                session_id: session_id.to_string(),
                from: current.state,
                event,
            },
            Err(err) => err,
        }
    }
}

fn require(session: &GameSession, event: SessionEvent) -> Result<SessionState, SessionError> {
    session
        .state
        .next(event)
        .ok_or_else(|| SessionError::InvalidTransition {
            session_id: session.id.clone(),
            from: session.state,
            event,
        })
}

fn ready_players(session: &GameSession) -> Vec<SessionPlayer> {
    session
        .device_numbers
        .iter()
        .zip(&session.player_names)
        .map(|(device, name)| SessionPlayer::ready(&session.id, device, name))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        db::{DeviceStatus, PlayerStatus},
        transport::testing::RecordingPublisher,
    };
    use pretty_assertions::assert_eq;

    struct Harness {
        db: Database,
        publisher: Arc<RecordingPublisher>,
        controller: SessionController,
    }

    async fn harness_with(publisher: RecordingPublisher, unit: Duration) -> Harness {
        let db = Database::open_in_memory().unwrap();
        for device in ["D1", "D2", "D3"] {
            db.register_device(device, device).await.unwrap();
            db.touch_heartbeat(device, Utc::now()).await.unwrap();
        }

        let publisher = Arc::new(publisher);
        let controller = SessionController::new(
            db.clone(),
            publisher.clone(),
            SessionTimers::new(unit),
            chrono::Duration::minutes(5),
        );
        Harness {
            db,
            publisher,
            controller,
        }
    }

    async fn harness() -> Harness {
        harness_with(RecordingPublisher::default(), Duration::from_secs(1)).await
    }

    fn setup(devices: &[&str], names: &[&str], round_seconds: u32) -> SessionSetup {
        SessionSetup {
            devices: devices.iter().map(|d| d.to_string()).collect(),
            player_names: names.iter().map(|n| n.to_string()).collect(),
            round_seconds,
        }
    }

    fn statuses(players: &[SessionPlayer]) -> Vec<PlayerStatus> {
        players.iter().map(|p| p.status).collect()
    }

    #[tokio::test]
    async fn full_lifecycle_create_start_end() {
        let h = harness().await;

        let created = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", "Bob"], 60), "admin")
            .await
            .unwrap();
        assert_eq!(created.state, SessionState::Pending);
        let players = h.db.get_session_players(&created.id).await.unwrap();
        assert_eq!(statuses(&players), vec![PlayerStatus::Ready; 2]);

        let started = h.controller.start(&created.id).await.unwrap();
        assert_eq!(started.state, SessionState::Active);
        assert!(started.started_at.is_some());
        assert!(h.controller.timers().is_armed(&created.id));
        let players = h.db.get_session_players(&created.id).await.unwrap();
        assert_eq!(statuses(&players), vec![PlayerStatus::Playing; 2]);
        for device in ["D1", "D2"] {
            assert_eq!(
                h.publisher.sent_to(device),
                vec![DeviceCommand::SetRoundDuration(60), DeviceCommand::Start]
            );
        }

        let ended = h.controller.end(&created.id).await.unwrap();
        assert_eq!(ended.state, SessionState::Completed);
        assert!(!h.controller.timers().is_armed(&created.id));

        let second = h.controller.end(&created.id).await.unwrap_err();
        assert!(matches!(
            second,
            SessionError::InvalidTransition {
                from: SessionState::Completed,
                event: SessionEvent::Complete,
                ..
            }
        ));

        let after = h.controller.get_session(&created.id).await.unwrap();
        assert_eq!(after.state, SessionState::Completed);
        assert_eq!(after.ended_at, ended.ended_at);
        let players = h.db.get_session_players(&created.id).await.unwrap();
        assert_eq!(statuses(&players), vec![PlayerStatus::Completed; 2]);
    }

    #[tokio::test]
    async fn create_rejects_offline_devices() {
        let h = harness().await;
        h.db.register_device("D4", "never seen").await.unwrap();
        h.db.set_device_status("D2", DeviceStatus::Inactive).await.unwrap();

        let err = h
            .controller
            .create(setup(&["D1", "D2", "D4"], &["A", "B", "C"], 60), "admin")
            .await
            .unwrap_err();

        match err {
            SessionError::DevicesOffline(devices) => assert_eq!(devices, vec!["D2", "D4"]),
            other => panic!("expected offline devices, got {other:?}"),
        }
        assert!(h
            .db
            .list_sessions_by_state(SessionState::Pending)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn stale_heartbeats_count_as_offline() {
        let h = harness().await;
        h.db.touch_heartbeat("D2", Utc::now() - chrono::Duration::minutes(6))
            .await
            .unwrap();

        let err = h
            .controller
            .create(setup(&["D1", "D2"], &["A", "B"], 60), "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::DevicesOffline(ref d) if d == &vec!["D2".to_string()]));
    }

    #[tokio::test]
    async fn invalid_setup_writes_nothing() {
        let h = harness().await;

        let err = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", " alice"], 60), "admin")
            .await
            .unwrap_err();

        assert!(matches!(err, SessionError::InvalidSetup(_)));
        assert!(err.is_client_error());
        assert!(h
            .db
            .list_sessions_by_state(SessionState::Pending)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn update_replaces_every_player_row() {
        let h = harness().await;
        let session = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", "Bob"], 60), "admin")
            .await
            .unwrap();

        let updated = h
            .controller
            .update(&session.id, setup(&["D3", "D1"], &["Cara", "Dan"], 120))
            .await
            .unwrap();
        assert_eq!(updated.round_seconds, 120);

        let players = h.db.get_session_players(&session.id).await.unwrap();
        let assignments: Vec<(String, String)> = players
            .into_iter()
            .map(|p| (p.device_number, p.player_name))
            .collect();
        assert_eq!(
            assignments,
            vec![
                ("D3".to_string(), "Cara".to_string()),
                ("D1".to_string(), "Dan".to_string()),
            ]
        );

        let stored = h.controller.get_session(&session.id).await.unwrap();
        assert_eq!(stored.device_numbers, vec!["D3", "D1"]);
    }

    #[tokio::test]
    async fn only_pending_sessions_can_be_updated_or_started() {
        let h = harness().await;
        let session = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", "Bob"], 60), "admin")
            .await
            .unwrap();
        h.controller.start(&session.id).await.unwrap();

        let update = h
            .controller
            .update(&session.id, setup(&["D1", "D2"], &["X", "Y"], 60))
            .await
            .unwrap_err();
        assert!(matches!(update, SessionError::InvalidTransition { from: SessionState::Active, .. }));

        let restart = h.controller.start(&session.id).await.unwrap_err();
        assert!(matches!(restart, SessionError::InvalidTransition { from: SessionState::Active, .. }));

        let cancel = h.controller.cancel(&session.id).await.unwrap_err();
        assert!(matches!(cancel, SessionError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn ending_a_pending_session_is_rejected() {
        let h = harness().await;
        let session = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", "Bob"], 60), "admin")
            .await
            .unwrap();

        let err = h.controller.end(&session.id).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidTransition { from: SessionState::Pending, .. }));
        assert!(matches!(
            h.controller.end("missing").await.unwrap_err(),
            SessionError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn cancel_is_terminal() {
        let h = harness().await;
        let session = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", "Bob"], 60), "admin")
            .await
            .unwrap();

        let cancelled = h.controller.cancel(&session.id).await.unwrap();
        assert_eq!(cancelled.state, SessionState::Cancelled);
        assert!(h.controller.start(&session.id).await.is_err());
        assert!(h.publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn publish_failures_do_not_undo_start() {
        let h = harness_with(RecordingPublisher::failing_for(&["D2"]), Duration::from_secs(1)).await;
        let session = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", "Bob"], 60), "admin")
            .await
            .unwrap();

        let started = h.controller.start(&session.id).await.unwrap();
        assert_eq!(started.state, SessionState::Active);
        assert_eq!(h.publisher.sent_to("D1").len(), 2);
        assert!(h.publisher.sent_to("D2").is_empty());
    }

    #[tokio::test]
    async fn round_timer_completes_the_session() {
        let h = harness_with(RecordingPublisher::default(), Duration::from_millis(1)).await;
        let session = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", "Bob"], 30), "admin")
            .await
            .unwrap();
        h.controller.start(&session.id).await.unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;

        let done = h.controller.get_session(&session.id).await.unwrap();
        assert_eq!(done.state, SessionState::Completed);
        assert!(done.ended_at.is_some());
        assert!(!h.controller.timers().is_armed(&session.id));
        let players = h.db.get_session_players(&session.id).await.unwrap();
        assert_eq!(statuses(&players), vec![PlayerStatus::Completed; 2]);
    }

    #[tokio::test]
    async fn late_timer_after_manual_end_writes_nothing() {
        let h = harness_with(RecordingPublisher::default(), Duration::from_millis(5)).await;
        let session = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", "Bob"], 600), "admin")
            .await
            .unwrap();
        h.controller.start(&session.id).await.unwrap();
        h.controller
            .record_player_score(&session.id, "D1", 4, 1, 0, 0.9)
            .await
            .unwrap();

        let ended = h.controller.end(&session.id).await.unwrap();
        let players_before = h.db.get_session_players(&session.id).await.unwrap();

        h.controller.arm_round_timer(&session.id, 1);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!h.controller.complete_if_active(&session.id).await.unwrap());
        let after = h.controller.get_session(&session.id).await.unwrap();
        assert_eq!(after.state, SessionState::Completed);
        assert_eq!(after.ended_at, ended.ended_at);
        assert_eq!(after.updated_at, ended.updated_at);
        assert_eq!(h.db.get_session_players(&session.id).await.unwrap(), players_before);
    }

    #[tokio::test]
    async fn results_rank_by_score_then_name() {
        let h = harness().await;
        let session = h
            .controller
            .create(setup(&["D1", "D2", "D3"], &["carol", "Bob", "Alice"], 60), "admin")
            .await
            .unwrap();
        h.controller.start(&session.id).await.unwrap();

        h.controller.record_player_score(&session.id, "D1", 5, 1, 0, 1.0).await.unwrap();
        h.controller.record_player_score(&session.id, "D2", 6, 2, 1, 1.1).await.unwrap();
        h.controller.record_player_score(&session.id, "D3", 3, 0, 2, 0.8).await.unwrap();

        let results = h.controller.results(&session.id).await.unwrap();
        let ranking: Vec<(&str, i64)> = results
            .players
            .iter()
            .map(|p| (p.player_name.as_str(), p.final_score))
            .collect();
        assert_eq!(ranking, vec![("Bob", 4), ("carol", 4), ("Alice", 3)]);

        let progress = h.controller.progress(&session.id).await.unwrap();
        let names: Vec<&str> = progress.players.iter().map(|p| p.player_name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "carol"]);
        assert!(progress.time_remaining_secs > 0 && progress.time_remaining_secs <= 60);
    }

    #[tokio::test]
    async fn scoring_an_unknown_player_fails() {
        let h = harness().await;
        let session = h
            .controller
            .create(setup(&["D1", "D2"], &["Alice", "Bob"], 60), "admin")
            .await
            .unwrap();

        let err = h
            .controller
            .record_player_score(&session.id, "D9", 1, 0, 0, 1.0)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownPlayer { .. }));
    }

    #[test]
    fn remaining_time_is_zero_unless_active() {
        let now = Utc::now();
        let mut session = GameSession {
            id: "S".into(),
            device_numbers: vec![],
            player_names: vec![],
            round_seconds: 60,
            state: SessionState::Active,
            started_at: Some(now - chrono::Duration::seconds(45)),
            ended_at: None,
            created_by: "admin".into(),
            created_at: now,
            updated_at: now,
        };
        assert_eq!(time_remaining(&session, now), 15);

        session.started_at = Some(now - chrono::Duration::seconds(90));
        assert_eq!(time_remaining(&session, now), 0);

        session.state = SessionState::Pending;
        session.started_at = None;
        assert_eq!(time_remaining(&session, now), 0);
    }

    #[tokio::test]
    async fn recovery_completes_overdue_and_rearms_the_rest() {
        let h = harness().await;
        let now = Utc::now();

        let mut overdue = GameSession {
            id: "overdue".into(),
            device_numbers: vec!["D1".into(), "D2".into()],
            player_names: vec!["A".into(), "B".into()],
            round_seconds: 60,
            state: SessionState::Active,
            started_at: Some(now - chrono::Duration::seconds(120)),
            ended_at: None,
            created_by: "admin".into(),
            created_at: now,
            updated_at: now,
        };
        h.db.insert_game_session(&overdue, ready_players(&overdue))
            .await
            .unwrap();

        overdue.id = "running".into();
        overdue.round_seconds = 600;
        overdue.started_at = Some(now);
        h.db.insert_game_session(&overdue, ready_players(&overdue))
            .await
            .unwrap();

        let summary = h.controller.recover_active_sessions().await.unwrap();
        assert_eq!(summary, RecoverySummary { completed: 1, rearmed: 1 });

        let completed = h.controller.get_session("overdue").await.unwrap();
        assert_eq!(completed.state, SessionState::Completed);
        assert!(h.controller.timers().is_armed("running"));
        assert!(!h.controller.timers().is_armed("overdue"));
    }
}
