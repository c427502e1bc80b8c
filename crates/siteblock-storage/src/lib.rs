pub mod db;
pub mod migrations;
pub mod models;

pub use db::Database;
pub use models::{
    Alarm, BlockRule, BlockedSite, ResourceType, RuleAction, RuleCondition, MS_PER_MINUTE,
};
