use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::DatabaseConfig;
use crate::database::schema::initialize_schema;
use crate::error::DatabaseError;
use crate::models::NormalizedTransaction;

/// SQLite-backed watermark and event storage
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Create a new database connection and initialize schema
    pub fn new(db_path: &str) -> Result<Self, DatabaseError> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// Open the configured database, applying WAL and busy-timeout settings
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let conn = Connection::open(&config.path)?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms as u64))?;
        if config.enable_wal_mode {
            // journal_mode returns the resulting mode as a row
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        }
        Self::init(conn)
    }

    /// Create an in-memory database for testing
    pub fn new_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, DatabaseError> {
        initialize_schema(&conn)?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::Lock("Failed to acquire lock".to_string()))
    }

    /// Last processed block for `chain`, 0 when the chain has never advanced
    pub fn get_watermark(&self, chain: &str) -> Result<u64, DatabaseError> {
        let conn = self.lock()?;

        let block: Option<u64> = conn
            .query_row(
                "SELECT last_block FROM watermarks WHERE chain = ?1",
                params![chain],
                |row| row.get(0),
            )
            .optional()?;

        Ok(block.unwrap_or(0))
    }

    /// Store `block` as the watermark for `chain`. A lower value than the one
    /// already stored is ignored. Returns the stored value.
    pub fn set_watermark(&self, chain: &str, block: u64) -> Result<u64, DatabaseError> {
        let conn = self.lock()?;

        let stored: u64 = conn.query_row(
            "INSERT INTO watermarks (chain, last_block, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(chain) DO UPDATE SET
                last_block = MAX(last_block, excluded.last_block),
                updated_at = excluded.updated_at
             RETURNING last_block",
            params![chain, block],
            |row| row.get(0),
        )?;

        Ok(stored)
    }

    pub fn all_watermarks(&self) -> Result<Vec<WatermarkRow>, DatabaseError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT chain, last_block, updated_at FROM watermarks ORDER BY chain",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(WatermarkRow {
                chain: row.get(0)?,
                last_block: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })?;

        let mut watermarks = Vec::new();
        for row in rows {
            watermarks.push(row?);
        }

        Ok(watermarks)
    }

    /// Record an emitted event. Returns false if `(chain, hash)` was already stored.
    pub fn record_event(&self, event: &NormalizedTransaction) -> Result<bool, DatabaseError> {
        let conn = self.lock()?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO events
                (chain, hash, from_address, to_address, value, currency, block_number, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.chain,
                event.hash,
                event.from,
                event.to,
                event.value.to_string(),
                event.currency,
                event.block,
                event.timestamp,
            ],
        )?;

        Ok(inserted == 1)
    }

    /// Most recent events first, optionally for one chain
    pub fn get_recent_events(
        &self,
        limit: u32,
        offset: u32,
        chain: Option<&str>,
    ) -> Result<Vec<EventRow>, DatabaseError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, chain, hash, from_address, to_address, value, currency, block_number, timestamp, created_at
             FROM events
             WHERE ?1 IS NULL OR chain = ?1
             ORDER BY id DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let rows = stmt.query_map(params![chain, limit, offset], |row| {
            Ok(EventRow {
                id: row.get(0)?,
                chain: row.get(1)?,
                hash: row.get(2)?,
                from_address: row.get(3)?,
                to_address: row.get(4)?,
                value: row.get(5)?,
                currency: row.get(6)?,
                block_number: row.get(7)?,
                timestamp: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }

        Ok(events)
    }

    pub fn get_event_count(&self, chain: Option<&str>) -> Result<u64, DatabaseError> {
        let conn = self.lock()?;

        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE ?1 IS NULL OR chain = ?1",
            params![chain],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// Close the database connection
    pub fn close(self) -> Result<(), DatabaseError> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| DatabaseError::Lock("Database still shared".to_string()))?
            .into_inner()
            .map_err(|_| DatabaseError::Lock("Failed to acquire lock".to_string()))?;

        conn.close().map_err(|(_, e)| DatabaseError::Connection(e))?;
        Ok(())
    }
}

/// Watermark row as stored
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatermarkRow {
    pub chain: String,
    pub last_block: u64,
    pub updated_at: i64,
}

/// Event row as stored; `value` is a decimal string of the smallest unit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventRow {
    pub id: i64,
    pub chain: String,
    pub hash: String,
    pub from_address: String,
    pub to_address: String,
    pub value: String,
    pub currency: String,
    pub block_number: u64,
    pub timestamp: u64,
    pub created_at: i64,
}
