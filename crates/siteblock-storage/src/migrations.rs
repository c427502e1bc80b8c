use anyhow::Result;
use rusqlite::Connection;

/// Initialize database schema
///
/// # Errors
///
/// Returns an error if table creation fails
pub fn init_schema(conn: &Connection) -> Result<()> {
    // Key-value store - JSON documents keyed by name (the block list mirror lives here)
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    // Dynamic rules - the installed network-filtering rule set
    conn.execute(
        "CREATE TABLE IF NOT EXISTS dynamic_rules (
            id INTEGER PRIMARY KEY,
            priority INTEGER NOT NULL,
            action TEXT NOT NULL,
            url_filter TEXT NOT NULL,
            resource_types TEXT NOT NULL
        )",
        [],
    )?;

    // Alarms - persistent one-shot timers, one per name
    conn.execute(
        "CREATE TABLE IF NOT EXISTS alarms (
            name TEXT PRIMARY KEY,
            scheduled_time INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alarms_scheduled_time ON alarms(scheduled_time)",
        [],
    )?;

    Ok(())
}
