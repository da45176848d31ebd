use anyhow::Result;
use chrono::{DateTime, Local, Timelike, Utc};
use log::{debug, info};

use crate::{
    db::{Database, DeviceScore, GameScoreReport},
    keyed_lock::KeyedLock,
    protocol::{GameStatus, ScoreCounters},
};

/// Percentage of ok presses over all presses, 0 when nothing was pressed.
pub fn success_rate(counters: &ScoreCounters) -> f64 {
    let total = counters.total_presses();
    if total == 0 {
        return 0.0;
    }
    f64::from(counters.ok_presses) / total as f64 * 100.0
}

/// Minutes played, estimated from the average response time.
pub fn total_play_time(counters: &ScoreCounters) -> f64 {
    counters.avg_response_time * counters.total_presses() as f64 / 60.0
}

/// Builds an unsaved completion report. The date and hour come from local time.
pub fn build_report(
    device_number: &str,
    counters: ScoreCounters,
    now: DateTime<Local>,
) -> GameScoreReport {
    GameScoreReport {
        id: 0,
        device_number: device_number.to_string(),
        success_rate: success_rate(&counters),
        total_play_time: total_play_time(&counters),
        counters,
        report_date: now.date_naive(),
        peak_hour: now.hour(),
        created_at: now.with_timezone(&Utc),
    }
}

#[derive(Clone)]
pub struct ScoreTracker {
    db: Database,
    locks: KeyedLock,
}

impl ScoreTracker {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            locks: KeyedLock::new(),
        }
    }

    /// Liveness ping. Unknown devices are ignored.
    pub async fn record_heartbeat(&self, device_number: &str) -> Result<bool> {
        let known = self.db.touch_heartbeat(device_number, Utc::now()).await?;
        if !known {
            debug!("Heartbeat from unregistered device {device_number} ignored");
        }
        Ok(known)
    }

    /// Replaces the live counters. Never produces a report.
    pub async fn apply_score_update(
        &self,
        device_number: &str,
        counters: ScoreCounters,
    ) -> Result<()> {
        let _guard = self.locks.lock(device_number).await;
        let now = Utc::now();
        self.db.touch_heartbeat(device_number, now).await?;
        self.db
            .overwrite_device_counters(device_number, counters, now)
            .await
    }

    /// Applies a game-status token. Returns the completion report when the
    /// token is STOP.
    pub async fn apply_status_update(
        &self,
        device_number: &str,
        status: GameStatus,
    ) -> Result<Option<GameScoreReport>> {
        let _guard = self.locks.lock(device_number).await;
        let now = Utc::now();
        self.db.touch_heartbeat(device_number, now).await?;

        let mut score = match self.db.get_device_score(device_number).await? {
            Some(score) => score,
            None => DeviceScore {
                device_number: device_number.to_string(),
                counters: ScoreCounters::default(),
                game_status: status.clone(),
                updated_at: now,
            },
        };
        if status == GameStatus::Start {
            score.counters = ScoreCounters::default();
        }
        let report = (status == GameStatus::Stop)
            .then(|| build_report(device_number, score.counters, Local::now()));
        score.game_status = status;
        score.updated_at = now;

        // The report and the score row are written in one transaction.
        let report = self.db.save_game_status(&score, report).await?;

        if let Some(report) = &report {
            info!(
                "Completion report {} for device {device_number}: ok={} wrong={} no={} success={:.1}%",
                report.id,
                report.counters.ok_presses,
                report.counters.wrong_presses,
                report.counters.no_presses,
                report.success_rate
            );
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn counters(ok: u32, wrong: u32, no: u32, avg: f64) -> ScoreCounters {
        ScoreCounters {
            ok_presses: ok,
            wrong_presses: wrong,
            no_presses: no,
            last_response_time: 0.5,
            avg_response_time: avg,
        }
    }

    async fn tracker_with_device() -> (Database, ScoreTracker) {
        let db = Database::open_in_memory().unwrap();
        db.register_device("D1", "Buzzer 1").await.unwrap();
        (db.clone(), ScoreTracker::new(db))
    }

    #[test]
    fn report_math() {
        let now = Local.with_ymd_and_hms(2024, 5, 17, 14, 30, 0).unwrap();
        let report = build_report("D1", counters(6, 3, 1, 1.5), now);

        assert_eq!(report.success_rate, 60.0);
        assert_eq!(report.total_play_time, 0.25);
        assert_eq!(report.peak_hour, 14);
        assert_eq!(report.report_date.to_string(), "2024-05-17");
    }

    #[test]
    fn zero_presses_give_zero_success_rate() {
        assert_eq!(success_rate(&ScoreCounters::default()), 0.0);
        assert_eq!(total_play_time(&ScoreCounters::default()), 0.0);
    }

    #[tokio::test]
    async fn score_updates_overwrite_and_never_report() {
        let (db, tracker) = tracker_with_device().await;

        tracker.apply_score_update("D1", counters(5, 1, 0, 1.0)).await.unwrap();
        tracker.apply_score_update("D1", counters(2, 0, 0, 0.7)).await.unwrap();

        let score = db.get_device_score("D1").await.unwrap().unwrap();
        assert_eq!(score.counters, counters(2, 0, 0, 0.7));
        assert!(db.reports_for_device("D1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_resets_all_counters_without_report() {
        let (db, tracker) = tracker_with_device().await;
        tracker.apply_score_update("D1", counters(9, 4, 2, 2.0)).await.unwrap();

        let report = tracker
            .apply_status_update("D1", GameStatus::Start)
            .await
            .unwrap();

        assert!(report.is_none());
        let score = db.get_device_score("D1").await.unwrap().unwrap();
        assert_eq!(score.counters, ScoreCounters::default());
        assert_eq!(score.game_status, GameStatus::Start);
        assert!(db.reports_for_device("D1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_stop_inserts_a_distinct_report() {
        let (db, tracker) = tracker_with_device().await;
        tracker.apply_score_update("D1", counters(3, 1, 0, 1.2)).await.unwrap();

        let first = tracker
            .apply_status_update("D1", GameStatus::Stop)
            .await
            .unwrap()
            .unwrap();
        let second = tracker
            .apply_status_update("D1", GameStatus::Stop)
            .await
            .unwrap()
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.success_rate, 75.0);
        assert_eq!(second.counters.ok_presses, 3);

        let reports = db.reports_for_device("D1").await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(db.get_report(first.id).await.unwrap().unwrap().success_rate, 75.0);

        let score = db.get_device_score("D1").await.unwrap().unwrap();
        assert_eq!(score.game_status, GameStatus::Stop);
        assert_eq!(score.counters.ok_presses, 3);
    }

    #[tokio::test]
    async fn stop_before_any_score_reports_zeros() {
        let (db, tracker) = tracker_with_device().await;

        let report = tracker
            .apply_status_update("D1", GameStatus::Stop)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.counters, ScoreCounters::default());
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(db.reports_for_device("D1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn other_tokens_are_stored_verbatim() {
        let (db, tracker) = tracker_with_device().await;
        tracker.apply_score_update("D1", counters(1, 1, 1, 1.0)).await.unwrap();

        let report = tracker
            .apply_status_update("D1", GameStatus::Other("PAUSE".into()))
            .await
            .unwrap();

        assert!(report.is_none());
        let score = db.get_device_score("D1").await.unwrap().unwrap();
        assert_eq!(score.game_status, GameStatus::Other("PAUSE".into()));
        assert_eq!(score.counters.ok_presses, 1);
    }

    #[tokio::test]
    async fn status_updates_refresh_the_heartbeat() {
        let (db, tracker) = tracker_with_device().await;
        assert!(db.get_device("D1").await.unwrap().unwrap().last_heartbeat_at.is_none());

        tracker
            .apply_status_update("D1", GameStatus::Start)
            .await
            .unwrap();

        assert!(db.get_device("D1").await.unwrap().unwrap().last_heartbeat_at.is_some());
    }

    #[tokio::test]
    async fn heartbeats_from_unknown_devices_are_ignored() {
        let (_db, tracker) = tracker_with_device().await;
        assert!(tracker.record_heartbeat("D1").await.unwrap());
        assert!(!tracker.record_heartbeat("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn huge_counters_still_produce_a_report() {
        let (_db, tracker) = tracker_with_device().await;
        tracker
            .apply_score_update("D1", counters(u32::MAX, 1, 0, 0.1))
            .await
            .unwrap();

        let report = tracker
            .apply_status_update("D1", GameStatus::Stop)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.counters.ok_presses, u32::MAX);
        assert!(report.success_rate > 99.9 && report.success_rate < 100.0);
        assert!(report.total_play_time > 0.0);
    }

    #[tokio::test]
    async fn failed_first_report_leaves_no_score_row() {
        let (db, tracker) = tracker_with_device().await;
        db.execute(|conn| {
            conn.execute_batch("DROP TABLE game_score_reports")?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(tracker
            .apply_status_update("D1", GameStatus::Stop)
            .await
            .is_err());
        assert!(db.get_device_score("D1").await.unwrap().is_none());
    }
}
