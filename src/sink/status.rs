#[cfg(test)]
use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
#[cfg(test)]
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::speed::Verdict;

/// Latest measurement for one attribute.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusRecord {
    pub color: String,
    pub speed: f64,
    pub status: String,
    /// UTC, `YYYY-mm-dd HH:MM:SS`.
    pub updated_at: String,
}

/// Keyed status store with last-write-wins semantics.
pub trait StatusStore: Send {
    fn upsert(&mut self, key: &str, speed: f64, verdict: Verdict) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<StatusRecord>>;

    /// All records, ordered by key.
    fn list(&self) -> Result<Vec<StatusRecord>>;
}

pub struct SqliteStatusStore {
    conn: Connection,
}

impl SqliteStatusStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("open status store {}", db_path.display()))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS vehicle_status (
              color TEXT PRIMARY KEY,
              speed_mph REAL,
              status TEXT,
              updated_at TEXT DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<StatusRecord> {
        Ok(StatusRecord {
            color: row.get(0)?,
            speed: row.get(1)?,
            status: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}

impl StatusStore for SqliteStatusStore {
    fn upsert(&mut self, key: &str, speed: f64, verdict: Verdict) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO vehicle_status(color, speed_mph, status, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(color) DO UPDATE SET
              speed_mph = excluded.speed_mph,
              status = excluded.status,
              updated_at = datetime('now')
            "#,
            params![key, speed, verdict.as_str()],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<StatusRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT color, speed_mph, status, updated_at FROM vehicle_status WHERE color = ?1",
                params![key],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    fn list(&self) -> Result<Vec<StatusRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT color, speed_mph, status, updated_at FROM vehicle_status ORDER BY color ASC",
        )?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| anyhow!("corrupt status row: {}", e))?);
        }
        Ok(out)
    }
}

#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub struct InMemoryStatusStore {
    records: BTreeMap<String, StatusRecord>,
}

#[cfg(test)]
impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl StatusStore for InMemoryStatusStore {
    fn upsert(&mut self, key: &str, speed: f64, verdict: Verdict) -> Result<()> {
        self.records.insert(
            key.to_string(),
            StatusRecord {
                color: key.to_string(),
                speed,
                status: verdict.to_string(),
                updated_at: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<StatusRecord>> {
        Ok(self.records.get(key).cloned())
    }

    fn list(&self) -> Result<Vec<StatusRecord>> {
        Ok(self.records.values().cloned().collect())
    }
}
