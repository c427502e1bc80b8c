//! Rule projection: turning the block list into host network-filtering rules.
//!
//! The projector never diffs. Every call fetches whatever is installed,
//! removes all of it, and installs one fresh rule per blocked site with ids
//! assigned from 1 in list order, all in one atomic engine update.

use regex::Regex;
use siteblock_storage::{BlockRule, BlockedSite, ResourceType};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::host::RuleEngine;

/// Reasons the rule engine refuses an update
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Rule id must be at least 1")]
    InvalidId,
    #[error("Rule {0} appears more than once in the update")]
    DuplicateId(u32),
    #[error("Rule {0} has an empty url filter")]
    EmptyFilter(u32),
    #[error("Rule {id} has an unusable url filter: {reason}")]
    InvalidFilter { id: u32, reason: String },
}

/// Regex fragment matching the scheme and any subdomain labels before a `||` anchor
const DOMAIN_ANCHOR: &str = r"^[a-z][a-z0-9+.\-]*://(?:[^/?#]*\.)?";
/// `^` matches anything that is not a letter, digit, `_ - . %`, or the end of the URL
const SEPARATOR: &str = r"(?:[^a-z0-9_.%\-]|$)";

/// Compiled declarative url filter
#[derive(Debug, Clone)]
pub struct UrlFilter {
    regex: Regex,
}

impl UrlFilter {
    /// Compile a filter such as `example.com`, `||example.com^` or `|https://a.com/*|`.
    ///
    /// Matching is a case-insensitive substring search unless anchored.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is empty or cannot be compiled
    pub fn compile(filter: &str) -> Result<Self, RuleError> {
        if filter.is_empty() {
            return Err(RuleError::EmptyFilter(0));
        }
        let regex = Regex::new(&filter_to_pattern(filter)).map_err(|e| {
            RuleError::InvalidFilter {
                id: 0,
                reason: e.to_string(),
            }
        })?;
        Ok(Self { regex })
    }

    #[must_use]
    pub fn is_match(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

fn filter_to_pattern(filter: &str) -> String {
    let mut pattern = String::from("(?i)");
    let mut body = filter;

    if let Some(rest) = body.strip_prefix("||") {
        pattern.push_str(DOMAIN_ANCHOR);
        body = rest;
    } else if let Some(rest) = body.strip_prefix('|') {
        pattern.push('^');
        body = rest;
    }

    let (body, anchored_end) = match body.strip_suffix('|') {
        Some(rest) => (rest, true),
        None => (body, false),
    };

    let mut buf = [0u8; 4];
    for c in body.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '^' => pattern.push_str(SEPARATOR),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }

    if anchored_end {
        pattern.push('$');
    }
    pattern
}

/// Check an update the way the host engine does before applying anything.
///
/// # Errors
///
/// Returns the first problem found; nothing should be applied in that case
pub fn validate_rules(add_rules: &[BlockRule]) -> Result<(), RuleError> {
    let mut seen = HashSet::new();
    for rule in add_rules {
        if rule.id == 0 {
            return Err(RuleError::InvalidId);
        }
        if !seen.insert(rule.id) {
            return Err(RuleError::DuplicateId(rule.id));
        }
        UrlFilter::compile(&rule.condition.url_filter).map_err(|e| match e {
            RuleError::EmptyFilter(_) => RuleError::EmptyFilter(rule.id),
            RuleError::InvalidFilter { reason, .. } => RuleError::InvalidFilter {
                id: rule.id,
                reason,
            },
            other => other,
        })?;
    }
    Ok(())
}

/// Pick the rule that decides `url`: highest priority wins, lowest id breaks ties
#[must_use]
pub fn evaluate<'a>(
    rules: &'a [BlockRule],
    url: &str,
    resource_type: ResourceType,
) -> Option<&'a BlockRule> {
    rules
        .iter()
        .filter(|rule| rule.condition.resource_types.contains(&resource_type))
        .filter(|rule| {
            UrlFilter::compile(&rule.condition.url_filter)
                .map(|filter| filter.is_match(url))
                .unwrap_or(false)
        })
        .min_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)))
}

/// Result of one projection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectionOutcome {
    Applied { installed: usize },
    Failed { reason: String },
}

impl ProjectionOutcome {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Keeps the engine's dynamic rules in step with the block list
pub struct RuleProjector {
    engine: Arc<dyn RuleEngine>,
    priority: u32,
}

impl RuleProjector {
    #[must_use]
    pub fn new(engine: Arc<dyn RuleEngine>, priority: u32) -> Self {
        Self { engine, priority }
    }

    /// One main-frame block rule per site, ids from 1 in list order
    #[must_use]
    pub fn build_rules(&self, sites: &[BlockedSite]) -> Vec<BlockRule> {
        (1u32..)
            .zip(sites)
            .map(|(id, site)| BlockRule::block_main_frame(id, self.priority, site.site.clone()))
            .collect()
    }

    /// Replace every installed rule with rules for `sites`.
    ///
    /// Failures are logged and reported in the outcome; nothing is retried.
    pub async fn project(&self, sites: &[BlockedSite]) -> ProjectionOutcome {
        let existing = match self.engine.get_dynamic_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                log::error!("Failed to read installed rules: {e:#}");
                return ProjectionOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let remove_ids: Vec<u32> = existing.iter().map(|rule| rule.id).collect();
        let add_rules = self.build_rules(sites);
        let installed = add_rules.len();

        match self.engine.update_dynamic_rules(&remove_ids, add_rules).await {
            Ok(()) => {
                log::debug!(
                    "Installed {installed} block rules (replaced {})",
                    remove_ids.len()
                );
                ProjectionOutcome::Applied { installed }
            }
            Err(e) => {
                log::error!("Error updating block rules: {e:#}");
                ProjectionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// The rule that would decide a top-level navigation to `url`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be queried
    pub async fn check(&self, url: &str) -> anyhow::Result<Option<BlockRule>> {
        self.engine.matches(url, ResourceType::MainFrame).await
    }
}
