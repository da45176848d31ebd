use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime},
    models::{
        Client, Sensor, SensorStatus, SensorStatusChange, SensorTransaction, TransactionKind,
    },
};

fn row_to_sensor(row: &Row) -> Result<Sensor> {
    let status: String = row.get("status")?;
    let status_changed_at: Option<String> = row.get("status_changed_at")?;

    Ok(Sensor {
        serial: row.get("serial")?,
        client_id: row.get("client_id")?,
        status: SensorStatus::parse(&status)?,
        status_changed_at: parse_optional_datetime(status_changed_at, "status_changed_at")?,
        description: row.get("description")?,
    })
}

fn row_to_transaction(row: &Row) -> Result<SensorTransaction> {
    let kind: String = row.get("kind")?;
    let occurred_at: String = row.get("occurred_at")?;

    Ok(SensorTransaction {
        id: row.get("id")?,
        serial: row.get("serial")?,
        kind: TransactionKind::parse(&kind)?,
        occurred_at: parse_datetime(&occurred_at, "occurred_at")?,
    })
}

impl Database {
    /// Inserts the client with `placeholder_name` unless it already exists.
    /// Returns true when a row was created.
    pub async fn ensure_client(&self, client_id: &str, placeholder_name: &str) -> Result<bool> {
        let client_id = client_id.to_string();
        let name = placeholder_name.to_string();
        self.execute(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO clients (id, name, created_at) VALUES (?1, ?2, ?3)",
                    params![client_id, name, Utc::now().to_rfc3339()],
                )
                .with_context(|| format!("failed to ensure client {client_id}"))?;
            Ok(inserted > 0)
        })
        .await
    }

    pub async fn get_client(&self, client_id: &str) -> Result<Option<Client>> {
        let client_id = client_id.to_string();
        self.execute(move |conn| {
            let client = conn
                .query_row(
                    "SELECT id, name, created_at FROM clients WHERE id = ?1",
                    params![client_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;

            client
                .map(|(id, name, created_at)| {
                    Ok(Client {
                        id,
                        name,
                        created_at: parse_datetime(&created_at, "created_at")?,
                    })
                })
                .transpose()
        })
        .await
    }

    /// Sensors of a client in serial order, which is also wire position order.
    pub async fn sensors_for_client(&self, client_id: &str) -> Result<Vec<Sensor>> {
        let client_id = client_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT serial, client_id, status, status_changed_at, description
                 FROM sensors
                 WHERE client_id = ?1
                 ORDER BY serial ASC",
            )?;

            let mut rows = stmt.query(params![client_id])?;
            let mut sensors = Vec::new();
            while let Some(row) = rows.next()? {
                sensors.push(row_to_sensor(row)?);
            }

            Ok(sensors)
        })
        .await
    }

    /// Creates the given serials as INACTIVE sensors of `client_id`.
    pub async fn provision_sensors(&self, client_id: &str, serials: Vec<String>) -> Result<usize> {
        let client_id = client_id.to_string();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut created = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO sensors (serial, client_id, status, status_changed_at, description)
                     VALUES (?1, ?2, ?3, NULL, ?4)",
                )?;
                for serial in &serials {
                    created += stmt.execute(params![
                        serial,
                        client_id,
                        SensorStatus::Inactive.as_str(),
                        "door sensor",
                    ])?;
                }
            }
            tx.commit()
                .with_context(|| format!("failed to provision sensors for {client_id}"))?;
            Ok(created)
        })
        .await
    }

    /// Writes every change and its transaction row in one transaction, all
    /// stamped with `at`.
    pub async fn apply_sensor_changes(
        &self,
        changes: Vec<SensorStatusChange>,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        if changes.is_empty() {
            return Ok(0);
        }

        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let stamp = at.to_rfc3339();
            for change in &changes {
                tx.execute(
                    "UPDATE sensors SET status = ?1, status_changed_at = ?2 WHERE serial = ?3",
                    params![change.status.as_str(), stamp, change.serial],
                )?;
                tx.execute(
                    "INSERT INTO sensor_transactions (serial, kind, occurred_at) VALUES (?1, ?2, ?3)",
                    params![
                        change.serial,
                        TransactionKind::from(change.status).as_str(),
                        stamp,
                    ],
                )?;
            }
            tx.commit().context("failed to apply sensor changes")?;
            Ok(changes.len())
        })
        .await
    }

    pub async fn transactions_for_sensor(&self, serial: &str) -> Result<Vec<SensorTransaction>> {
        let serial = serial.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, serial, kind, occurred_at
                 FROM sensor_transactions
                 WHERE serial = ?1
                 ORDER BY id ASC",
            )?;

            let mut rows = stmt.query(params![serial])?;
            let mut transactions = Vec::new();
            while let Some(row) = rows.next()? {
                transactions.push(row_to_transaction(row)?);
            }

            Ok(transactions)
        })
        .await
    }

    pub async fn count_sensor_transactions(&self) -> Result<i64> {
        self.execute(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM sensor_transactions", [], |row| {
                row.get(0)
            })?)
        })
        .await
    }
}
