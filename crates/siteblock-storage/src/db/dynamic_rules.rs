use anyhow::{Context, Result};
use rusqlite::params;

use super::Database;
use crate::models::{BlockRule, ResourceType, RuleCondition};

type RuleRow = (u32, u32, String, String, String);

impl Database {
    /// All installed dynamic rules, ordered by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored rule cannot be decoded
    pub fn get_dynamic_rules(&self) -> Result<Vec<BlockRule>> {
        let rows: Vec<RuleRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                "SELECT id, priority, action, url_filter, resource_types
                 FROM dynamic_rules
                 ORDER BY id ASC",
            )?;
            let mapped = stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()?
        };

        rows.into_iter().map(Self::row_to_rule).collect()
    }

    /// Remove `remove_ids` and insert `add_rules` in a single transaction.
    ///
    /// Either the whole update applies or none of it does. Adding an id that
    /// is still installed after the removals fails the update.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails; the transaction is rolled back
    pub fn replace_dynamic_rules(&self, remove_ids: &[u32], add_rules: &[BlockRule]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for id in remove_ids {
            tx.execute("DELETE FROM dynamic_rules WHERE id = ?1", params![id])?;
        }

        for rule in add_rules {
            let resource_types = rule
                .condition
                .resource_types
                .iter()
                .map(ResourceType::as_str)
                .collect::<Vec<_>>()
                .join(",");
            tx.execute(
                "INSERT INTO dynamic_rules (id, priority, action, url_filter, resource_types)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    rule.id,
                    rule.priority,
                    rule.action.as_str(),
                    rule.condition.url_filter,
                    resource_types,
                ],
            )
            .with_context(|| format!("Failed to install rule {}", rule.id))?;
        }

        tx.commit()?;
        Ok(())
    }

    fn row_to_rule(row: RuleRow) -> Result<BlockRule> {
        let (id, priority, action, url_filter, resource_types) = row;
        let resource_types = resource_types
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<ResourceType>>>()?;

        Ok(BlockRule {
            id,
            priority,
            action: action.parse()?,
            condition: RuleCondition {
                url_filter,
                resource_types,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::{BlockRule, Database};

    #[test]
    fn test_replace_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let rules = vec![
            BlockRule::block_main_frame(1, 1, "a.com"),
            BlockRule::block_main_frame(2, 1, "b.com"),
        ];
        db.replace_dynamic_rules(&[], &rules).unwrap();
        assert_eq!(db.get_dynamic_rules().unwrap(), rules);
    }

    #[test]
    fn test_replace_removes_then_adds() {
        let db = Database::open_in_memory().unwrap();
        db.replace_dynamic_rules(
            &[],
            &[
                BlockRule::block_main_frame(1, 1, "a.com"),
                BlockRule::block_main_frame(2, 1, "b.com"),
            ],
        )
        .unwrap();

        db.replace_dynamic_rules(&[1, 2], &[BlockRule::block_main_frame(1, 1, "b.com")])
            .unwrap();

        let rules = db.get_dynamic_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, 1);
        assert_eq!(rules[0].condition.url_filter, "b.com");
    }

    #[test]
    fn test_conflicting_id_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        db.replace_dynamic_rules(&[], &[BlockRule::block_main_frame(1, 1, "a.com")])
            .unwrap();

        // id 1 is not removed, so adding it again must fail as a whole
        let result = db.replace_dynamic_rules(
            &[],
            &[
                BlockRule::block_main_frame(2, 1, "b.com"),
                BlockRule::block_main_frame(1, 1, "c.com"),
            ],
        );
        assert!(result.is_err());

        let rules = db.get_dynamic_rules().unwrap();
        assert_eq!(rules, vec![BlockRule::block_main_frame(1, 1, "a.com")]);
    }
}
