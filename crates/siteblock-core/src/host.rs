use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use siteblock_storage::{Alarm, BlockRule, Database, ResourceType};
use std::sync::Arc;

use crate::rules::{evaluate, validate_rules};

/// Asynchronous key-value storage holding JSON documents
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value under `key`, `None` when never set
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Engine that owns the dynamic network-filtering rules
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// Every currently installed dynamic rule
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried
    async fn get_dynamic_rules(&self) -> Result<Vec<BlockRule>>;

    /// Remove `remove_rule_ids` and add `add_rules` atomically
    ///
    /// # Errors
    ///
    /// Returns an error if the update is rejected; nothing is applied then
    async fn update_dynamic_rules(&self, remove_rule_ids: &[u32], add_rules: Vec<BlockRule>)
        -> Result<()>;

    /// The rule deciding a request for `url`, if any applies
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried
    async fn matches(&self, url: &str, resource_type: ResourceType) -> Result<Option<BlockRule>>;
}

/// Persistent one-shot timers that outlive the daemon process
#[async_trait]
pub trait AlarmService: Send + Sync {
    /// Schedule `name` at absolute time `when` (epoch ms); same name replaces
    ///
    /// # Errors
    ///
    /// Returns an error if the alarm cannot be stored
    async fn create(&self, name: &str, when: i64) -> Result<()>;

    /// Cancel `name`; returns whether it was scheduled
    ///
    /// # Errors
    ///
    /// Returns an error if the alarm store cannot be written
    async fn clear(&self, name: &str) -> Result<bool>;

    /// Every scheduled alarm, earliest first
    ///
    /// # Errors
    ///
    /// Returns an error if the alarm store cannot be read
    async fn get_all(&self) -> Result<Vec<Alarm>>;
}

/// The three host services the daemon runs against
#[derive(Clone)]
pub struct Host {
    pub storage: Arc<dyn KeyValueStore>,
    pub rules: Arc<dyn RuleEngine>,
    pub alarms: Arc<dyn AlarmService>,
}

impl Host {
    /// Back every host service with one SQLite database
    #[must_use]
    pub fn from_database(db: Arc<Database>) -> Self {
        Self {
            storage: db.clone(),
            rules: db.clone(),
            alarms: db,
        }
    }
}

#[async_trait]
impl KeyValueStore for Database {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.get_value(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.set_value(key, &value.to_string())
    }
}

#[async_trait]
impl RuleEngine for Database {
    async fn get_dynamic_rules(&self) -> Result<Vec<BlockRule>> {
        Database::get_dynamic_rules(self)
    }

    async fn update_dynamic_rules(
        &self,
        remove_rule_ids: &[u32],
        add_rules: Vec<BlockRule>,
    ) -> Result<()> {
        validate_rules(&add_rules)?;
        self.replace_dynamic_rules(remove_rule_ids, &add_rules)
    }

    async fn matches(&self, url: &str, resource_type: ResourceType) -> Result<Option<BlockRule>> {
        let rules = Database::get_dynamic_rules(self)?;
        Ok(evaluate(&rules, url, resource_type).cloned())
    }
}

#[async_trait]
impl AlarmService for Database {
    async fn create(&self, name: &str, when: i64) -> Result<()> {
        self.upsert_alarm(&Alarm {
            name: name.to_string(),
            scheduled_time: when,
        })
    }

    async fn clear(&self, name: &str) -> Result<bool> {
        self.delete_alarm(name)
    }

    async fn get_all(&self) -> Result<Vec<Alarm>> {
        self.get_alarms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use siteblock_storage::RuleAction;

    fn host() -> (Arc<Database>, Host) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (db.clone(), Host::from_database(db))
    }

    #[tokio::test]
    async fn test_storage_roundtrip() {
        let (_, host) = host();
        assert!(host.storage.get("blockedWebsites").await.unwrap().is_none());

        let value = json!([{ "site": "a.com", "finishTime": 10 }]);
        host.storage.set("blockedWebsites", value.clone()).await.unwrap();
        assert_eq!(host.storage.get("blockedWebsites").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_invalid_update_leaves_rules_untouched() {
        let (_, host) = host();
        host.rules
            .update_dynamic_rules(&[], vec![BlockRule::block_main_frame(1, 1, "a.com")])
            .await
            .unwrap();

        let result = host
            .rules
            .update_dynamic_rules(&[1], vec![BlockRule::block_main_frame(1, 1, "")])
            .await;
        assert!(result.is_err());

        let rules = host.rules.get_dynamic_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].condition.url_filter, "a.com");
    }

    #[tokio::test]
    async fn test_matches_only_main_frame() {
        let (_, host) = host();
        host.rules
            .update_dynamic_rules(&[], vec![BlockRule::block_main_frame(1, 1, "example.com")])
            .await
            .unwrap();

        let hit = host
            .rules
            .matches("https://example.com/news", ResourceType::MainFrame)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, 1);
        assert_eq!(hit.action, RuleAction::Block);

        let miss = host
            .rules
            .matches("https://example.com/news", ResourceType::SubFrame)
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_alarm_service_replaces_same_name() {
        let (db, host) = host();
        host.alarms.create("a.com", 100).await.unwrap();
        host.alarms.create("a.com", 200).await.unwrap();

        let alarms = db.get_alarms().unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].scheduled_time, 200);

        assert!(host.alarms.clear("a.com").await.unwrap());
        assert!(!host.alarms.clear("a.com").await.unwrap());
    }
}
