use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::Database;

impl Database {
    /// Get the raw JSON text stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Store JSON text under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn set_value(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Delete `key`; returns whether it existed
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn remove_value(&self, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }
}
