//! Expiry scheduling for blocked sites.
//!
//! Each site owns at most one persistent alarm, named after the site and set
//! to its absolute finish time. The in-process `armed` map mirrors those
//! alarms so the daemon knows its next deadline without querying the host.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use crate::host::AlarmService;

pub struct ExpiryScheduler {
    alarms: Arc<dyn AlarmService>,
    armed: HashMap<String, i64>,
}

impl ExpiryScheduler {
    #[must_use]
    pub fn new(alarms: Arc<dyn AlarmService>) -> Self {
        Self {
            alarms,
            armed: HashMap::new(),
        }
    }

    /// Cancel any alarm for `site`, then schedule a new one at `finish_time`
    ///
    /// # Errors
    ///
    /// Returns an error if the alarm service rejects either call; the
    /// in-process entry is still recorded
    pub async fn arm(&mut self, site: &str, finish_time: i64) -> Result<()> {
        self.armed.insert(site.to_string(), finish_time);
        self.alarms.clear(site).await?;
        self.alarms.create(site, finish_time).await?;
        log::debug!("Armed expiry for {site} at {finish_time}");
        Ok(())
    }

    /// Drop the alarm for `site`; absent sites are a no-op
    ///
    /// # Errors
    ///
    /// Returns an error if the alarm service cannot be written
    pub async fn cancel(&mut self, site: &str) -> Result<bool> {
        let was_armed = self.armed.remove(site).is_some();
        let had_alarm = self.alarms.clear(site).await?;
        Ok(was_armed || had_alarm)
    }

    /// Names whose alarm is due at `now_ms`, each reported once and cleared.
    ///
    /// Persistent alarms and in-process entries are merged; if the alarm
    /// service cannot be read the in-process entries still fire.
    pub async fn take_due(&mut self, now_ms: i64) -> Vec<String> {
        let mut due: Vec<(i64, String)> = self
            .armed
            .iter()
            .filter(|(_, at)| **at <= now_ms)
            .map(|(name, at)| (*at, name.clone()))
            .collect();

        match self.alarms.get_all().await {
            Ok(alarms) => {
                for alarm in alarms {
                    if alarm.scheduled_time <= now_ms
                        && !due.iter().any(|(_, name)| *name == alarm.name)
                    {
                        due.push((alarm.scheduled_time, alarm.name));
                    }
                }
            }
            Err(e) => log::error!("Failed to read alarms: {e:#}"),
        }

        due.sort();

        let mut names = Vec::with_capacity(due.len());
        for (_, name) in due {
            self.armed.remove(&name);
            if let Err(e) = self.alarms.clear(&name).await {
                log::warn!("Failed to clear fired alarm {name}: {e:#}");
            }
            names.push(name);
        }
        names
    }

    /// Earliest in-process fire time, if anything is armed
    #[must_use]
    pub fn next_deadline(&self) -> Option<i64> {
        self.armed.values().copied().min()
    }

    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Host;
    use siteblock_storage::Database;

    fn scheduler() -> (Arc<Database>, ExpiryScheduler) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let host = Host::from_database(db.clone());
        (db, ExpiryScheduler::new(host.alarms))
    }

    #[tokio::test]
    async fn test_arm_creates_persistent_alarm() {
        let (db, mut scheduler) = scheduler();
        scheduler.arm("a.com", 5_000).await.unwrap();

        let alarms = db.get_alarms().unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].name, "a.com");
        assert_eq!(alarms[0].scheduled_time, 5_000);
        assert_eq!(scheduler.next_deadline(), Some(5_000));
    }

    #[tokio::test]
    async fn test_rearm_replaces_previous_alarm() {
        let (db, mut scheduler) = scheduler();
        scheduler.arm("a.com", 5_000).await.unwrap();
        scheduler.arm("a.com", 9_000).await.unwrap();

        let alarms = db.get_alarms().unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].scheduled_time, 9_000);
        assert_eq!(scheduler.armed_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (db, mut scheduler) = scheduler();
        scheduler.arm("a.com", 5_000).await.unwrap();

        assert!(scheduler.cancel("a.com").await.unwrap());
        assert!(!scheduler.cancel("a.com").await.unwrap());
        assert!(db.get_alarms().unwrap().is_empty());
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[tokio::test]
    async fn test_take_due_fires_once_in_order() {
        let (db, mut scheduler) = scheduler();
        scheduler.arm("late.com", 9_000).await.unwrap();
        scheduler.arm("b.com", 2_000).await.unwrap();
        scheduler.arm("a.com", 1_000).await.unwrap();

        assert!(scheduler.take_due(999).await.is_empty());

        let due = scheduler.take_due(2_000).await;
        assert_eq!(due, vec!["a.com".to_string(), "b.com".to_string()]);
        assert!(scheduler.take_due(2_000).await.is_empty());

        let remaining = db.get_alarms().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "late.com");
        assert_eq!(scheduler.next_deadline(), Some(9_000));
    }

    #[tokio::test]
    async fn test_take_due_sees_alarms_from_previous_run() {
        let (db, mut scheduler) = scheduler();
        db.upsert_alarm(&siteblock_storage::Alarm {
            name: "old.com".to_string(),
            scheduled_time: 100,
        })
        .unwrap();

        assert_eq!(scheduler.take_due(100).await, vec!["old.com".to_string()]);
        assert!(db.get_alarms().unwrap().is_empty());
    }
}
