use anyhow::Result;
use chrono::Utc;
use log::{info, warn};

use crate::{
    db::{Database, Sensor, SensorStatus, SensorStatusChange},
    keyed_lock::KeyedLock,
};

/// Code that always means a faulty sensor, whatever the active code is.
const BAD_SENSOR_CODE: &str = "2";
const PLACEHOLDER_CLIENT_NAME: &str = "Unnamed client";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Applied { changed: usize },
    /// The client has fewer sensors than the batch carries codes.
    Skipped { available: usize, required: usize },
}

pub fn status_for_code(code: &str, active_code: &str) -> SensorStatus {
    if code == active_code {
        SensorStatus::Active
    } else if code == BAD_SENSOR_CODE {
        SensorStatus::Bad
    } else {
        SensorStatus::Inactive
    }
}

/// Pairs sensors with new statuses by position and keeps only real changes.
/// `previous` must be read before any write of the batch.
pub fn diff_statuses(previous: &[Sensor], statuses: &[SensorStatus]) -> Vec<SensorStatusChange> {
    previous
        .iter()
        .zip(statuses)
        .filter(|(sensor, status)| sensor.status != **status)
        .map(|(sensor, status)| SensorStatusChange {
            serial: sensor.serial.clone(),
            status: *status,
        })
        .collect()
}

pub fn well_known_serials(client_id: &str, count: usize) -> Vec<String> {
    (1..=count)
        .map(|position| format!("{client_id}_SENSOR{position:03}"))
        .collect()
}

#[derive(Clone)]
pub struct SensorTracker {
    db: Database,
    locks: KeyedLock,
    sensors_per_client: usize,
    active_code: String,
}

impl SensorTracker {
    pub fn new(db: Database, sensors_per_client: usize, active_code: impl Into<String>) -> Self {
        Self {
            db,
            locks: KeyedLock::new(),
            sensors_per_client,
            active_code: active_code.into(),
        }
    }

    pub async fn apply_batch(&self, client_id: &str, codes: &[String]) -> Result<BatchOutcome> {
        let _guard = self.locks.lock(client_id).await;

        if self.db.ensure_client(client_id, PLACEHOLDER_CLIENT_NAME).await? {
            info!("Registered new sensor client {client_id}");
        }

        let mut sensors = self.db.sensors_for_client(client_id).await?;
        if sensors.is_empty() {
            let serials = well_known_serials(client_id, self.sensors_per_client);
            let created = self.db.provision_sensors(client_id, serials).await?;
            info!("Provisioned {created} sensors for client {client_id}");
            sensors = self.db.sensors_for_client(client_id).await?;
        }

        if sensors.len() < codes.len() {
            warn!(
                "Skipping batch for client {client_id}: {} sensors known, {} codes received",
                sensors.len(),
                codes.len()
            );
            return Ok(BatchOutcome::Skipped {
                available: sensors.len(),
                required: codes.len(),
            });
        }

        let statuses: Vec<SensorStatus> = codes
            .iter()
            .map(|code| status_for_code(code, &self.active_code))
            .collect();
        let changes = diff_statuses(&sensors, &statuses);
        let changed = self.db.apply_sensor_changes(changes, Utc::now()).await?;

        if changed > 0 {
            info!("Client {client_id}: {changed} sensor status change(s)");
        }

        Ok(BatchOutcome::Applied { changed })
    }
}
