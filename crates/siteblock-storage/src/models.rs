use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milliseconds in one minute, the unit block durations are expressed in
pub const MS_PER_MINUTE: i64 = 60_000;

/// A site the user asked to block, paired with the moment the block lapses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedSite {
    /// Hostname or URL pattern exactly as entered; never normalized
    #[serde(alias = "website")]
    pub site: String,
    /// Epoch milliseconds
    pub finish_time: i64,
}

impl BlockedSite {
    #[must_use]
    pub fn new(site: impl Into<String>, finish_time: i64) -> Self {
        Self {
            site: site.into(),
            finish_time,
        }
    }

    /// Block starting at `now_ms` and lasting `duration_minutes`
    #[must_use]
    pub fn for_duration(site: impl Into<String>, now_ms: i64, duration_minutes: i64) -> Self {
        Self::new(
            site,
            now_ms.saturating_add(duration_minutes.saturating_mul(MS_PER_MINUTE)),
        )
    }

    #[must_use]
    pub const fn is_expired(&self, now_ms: i64) -> bool {
        self.finish_time <= now_ms
    }

    /// Milliseconds left before the block lapses, zero once expired
    #[must_use]
    pub const fn remaining_ms(&self, now_ms: i64) -> i64 {
        if self.finish_time > now_ms {
            self.finish_time - now_ms
        } else {
            0
        }
    }
}

/// What the rule engine does with a matching request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleAction {
    Block,
    Allow,
}

/// Kind of request a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Top-level page navigation
    MainFrame,
    SubFrame,
    Other,
}

impl ResourceType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MainFrame => "main_frame",
            Self::SubFrame => "sub_frame",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main_frame" => Ok(Self::MainFrame),
            "sub_frame" => Ok(Self::SubFrame),
            "other" => Ok(Self::Other),
            _ => Err(anyhow::anyhow!("Unknown resource type: {s}")),
        }
    }
}

impl RuleAction {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Allow => "allow",
        }
    }
}

impl FromStr for RuleAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Self::Block),
            "allow" => Ok(Self::Allow),
            _ => Err(anyhow::anyhow!("Unknown rule action: {s}")),
        }
    }
}

/// Which requests a rule matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

/// Dynamic network-filtering rule installed at runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl BlockRule {
    /// Rule blocking top-level navigation to anything matching `url_filter`
    #[must_use]
    pub fn block_main_frame(id: u32, priority: u32, url_filter: impl Into<String>) -> Self {
        Self {
            id,
            priority,
            action: RuleAction::Block,
            condition: RuleCondition {
                url_filter: url_filter.into(),
                resource_types: vec![ResourceType::MainFrame],
            },
        }
    }
}

/// Persistent one-shot timer, keyed by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub name: String,
    /// Epoch milliseconds
    pub scheduled_time: i64,
}
