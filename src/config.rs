use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH_ENV: &str = "FIELDHUB_CONFIG";
pub const DATABASE_PATH_ENV: &str = "FIELDHUB_DB";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HubConfig {
    pub database_path: PathBuf,
    pub sensor_topic: String,
    pub device_topic: String,
    /// Outbound commands go to `{command_topic_prefix}/{device_number}`.
    pub command_topic_prefix: String,
    pub sensors_per_client: usize,
    /// Status code that marks a sensor ACTIVE. `"2"` is always BAD.
    pub active_sensor_code: String,
    pub liveness_window_secs: u64,
    /// Wall-clock length of one second of round time.
    pub timer_unit_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("fieldhub.sqlite3"),
            sensor_topic: "sensors/status".into(),
            device_topic: "devices/status".into(),
            command_topic_prefix: "devices/command".into(),
            sensors_per_client: 15,
            active_sensor_code: "1".into(),
            liveness_window_secs: 300,
            timer_unit_ms: 1000,
        }
    }
}

impl HubConfig {
    /// Reads the file named by `FIELDHUB_CONFIG` (defaults if unset or
    /// missing) and applies the `FIELDHUB_DB` override.
    pub fn load() -> Result<Self> {
        let mut config = match env::var_os(CONFIG_PATH_ENV) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };

        if let Some(db_path) = env::var_os(DATABASE_PATH_ENV) {
            config.database_path = PathBuf::from(db_path);
        }

        Ok(config)
    }

    pub fn from_file(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            log::warn!("Config file {} not found; using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(contents)?;
        config.liveness_window()?;
        Ok(config)
    }

    pub fn liveness_window(&self) -> Result<chrono::Duration> {
        i64::try_from(self.liveness_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .with_context(|| {
                format!(
                    "livenessWindowSecs {} is out of range",
                    self.liveness_window_secs
                )
            })
    }

    pub fn timer_unit(&self) -> Duration {
        Duration::from_millis(self.timer_unit_ms)
    }

    /// True for the two topics the hub subscribes to.
    pub fn is_telemetry_topic(&self, topic: &str) -> bool {
        topic == self.sensor_topic || topic == self.device_topic
    }
}
