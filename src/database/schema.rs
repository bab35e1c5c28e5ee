use rusqlite::{Connection, Result};

/// Initialize the database schema with required tables
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Last fully processed block per chain
    conn.execute(
        "CREATE TABLE IF NOT EXISTS watermarks (
            chain TEXT PRIMARY KEY,
            last_block INTEGER NOT NULL CHECK (last_block >= 0),
            updated_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    // Every event handed to the sink, for the status surfaces
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chain TEXT NOT NULL,
            hash TEXT NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT NOT NULL,
            value TEXT NOT NULL,
            currency TEXT NOT NULL,
            block_number INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            created_at INTEGER DEFAULT (strftime('%s', 'now')),
            UNIQUE(chain, hash)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_chain_block ON events(chain, block_number)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at)",
        [],
    )?;

    Ok(())
}

