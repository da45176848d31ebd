use anyhow::{bail, Context, Result};
use rusqlite::{Connection, Transaction};

/// Schema scripts in version order: entry `n` upgrades version `n` to `n + 1`.
const SCHEMAS: [(&str, &str); 2] = [
    ("schema_v1.sql", include_str!("schemas/schema_v1.sql")),
    ("schema_v2.sql", include_str!("schemas/schema_v2.sql")),
];

const CURRENT_SCHEMA_VERSION: i32 = SCHEMAS.len() as i32;

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let mut version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;

    if version > CURRENT_SCHEMA_VERSION {
        bail!(
            "database version ({}) is newer than supported schema ({})",
            version,
            CURRENT_SCHEMA_VERSION
        );
    }

    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    while version < CURRENT_SCHEMA_VERSION {
        let next_version = version + 1;
        apply_migration(&tx, next_version)
            .with_context(|| format!("migration to version {next_version} failed"))?;
        version = next_version;
    }

    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<()> {
    let (name, sql) = usize::try_from(version - 1)
        .ok()
        .and_then(|index| SCHEMAS.get(index))
        .with_context(|| format!("unknown migration target version: {version}"))?;
    tx.execute_batch(sql)
        .with_context(|| format!("failed to execute {name}"))
}
