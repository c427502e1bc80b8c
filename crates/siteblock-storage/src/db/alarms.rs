use anyhow::Result;
use rusqlite::params;

use super::Database;
use crate::models::Alarm;

impl Database {
    /// Schedule an alarm; an existing alarm with the same name is replaced
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn upsert_alarm(&self, alarm: &Alarm) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO alarms (name, scheduled_time) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET scheduled_time = excluded.scheduled_time",
            params![alarm.name, alarm.scheduled_time],
        )?;
        Ok(())
    }

    /// Delete an alarm by name; returns whether one existed
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails
    pub fn delete_alarm(&self, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM alarms WHERE name = ?1", params![name])?;
        Ok(removed > 0)
    }

    /// All scheduled alarms, earliest first
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_alarms(&self) -> Result<Vec<Alarm>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, scheduled_time FROM alarms ORDER BY scheduled_time ASC, name ASC",
        )?;

        let alarms = stmt
            .query_map([], |row| {
                Ok(Alarm {
                    name: row.get(0)?,
                    scheduled_time: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(alarms)
    }

    /// Alarms whose scheduled time is at or before `now_ms`
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails
    pub fn get_due_alarms(&self, now_ms: i64) -> Result<Vec<Alarm>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, scheduled_time FROM alarms
             WHERE scheduled_time <= ?1
             ORDER BY scheduled_time ASC, name ASC",
        )?;

        let alarms = stmt
            .query_map(params![now_ms], |row| {
                Ok(Alarm {
                    name: row.get(0)?,
                    scheduled_time: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(alarms)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Alarm, Database};

    fn alarm(name: &str, at: i64) -> Alarm {
        Alarm {
            name: name.to_string(),
            scheduled_time: at,
        }
    }

    #[test]
    fn test_same_name_replaces() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_alarm(&alarm("example.com", 100)).unwrap();
        db.upsert_alarm(&alarm("example.com", 500)).unwrap();

        let alarms = db.get_alarms().unwrap();
        assert_eq!(alarms, vec![alarm("example.com", 500)]);
    }

    #[test]
    fn test_due_alarms_filter_and_order() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_alarm(&alarm("late.com", 900)).unwrap();
        db.upsert_alarm(&alarm("b.com", 200)).unwrap();
        db.upsert_alarm(&alarm("a.com", 100)).unwrap();

        let due = db.get_due_alarms(200).unwrap();
        assert_eq!(due, vec![alarm("a.com", 100), alarm("b.com", 200)]);
    }

    #[test]
    fn test_delete_alarm() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_alarm(&alarm("a.com", 100)).unwrap();
        assert!(db.delete_alarm("a.com").unwrap());
        assert!(!db.delete_alarm("a.com").unwrap());
        assert!(db.get_alarms().unwrap().is_empty());
    }
}
