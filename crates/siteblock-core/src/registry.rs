//! The block registry: sole owner of the list of blocked sites.
//!
//! Every mutation is followed by a full persist, a rule projection, and an
//! alarm update. Host failures along that path are logged and never roll the
//! in-memory list back. The next mutation re-syncs storage and rules from it.

use siteblock_storage::{BlockRule, BlockedSite, RuleAction};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{Config, DuplicatePolicy};
use crate::host::{Host, KeyValueStore};
use crate::rules::{ProjectionOutcome, RuleProjector};
use crate::scheduler::ExpiryScheduler;

/// Storage key holding the persisted block list
pub const STORAGE_KEY: &str = "blockedWebsites";

/// What `restore` found in storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Entries still in force and re-armed
    pub restored: usize,
    /// Entries already past their finish time and dropped
    pub expired: usize,
}

pub struct BlockRegistry {
    sites: Vec<BlockedSite>,
    storage: Arc<dyn KeyValueStore>,
    projector: RuleProjector,
    scheduler: ExpiryScheduler,
    clock: Arc<dyn Clock>,
    policy: DuplicatePolicy,
}

impl BlockRegistry {
    #[must_use]
    pub fn new(host: &Host, clock: Arc<dyn Clock>, config: &Config) -> Self {
        Self {
            sites: Vec::new(),
            storage: host.storage.clone(),
            projector: RuleProjector::new(host.rules.clone(), config.rule_priority),
            scheduler: ExpiryScheduler::new(host.alarms.clone()),
            clock,
            policy: config.duplicate_policy,
        }
    }

    /// Block `site` for `duration_minutes` starting now.
    ///
    /// The duration is not validated; zero or negative durations produce an
    /// entry that expires on the next alarm check.
    pub async fn add(&mut self, site: &str, duration_minutes: i64) -> BlockedSite {
        let entry = BlockedSite::for_duration(site, self.clock.now_ms(), duration_minutes);

        if self.policy == DuplicatePolicy::Replace {
            let before = self.sites.len();
            self.sites.retain(|existing| existing.site != site);
            if self.sites.len() != before {
                log::info!("Replacing existing block for {site}");
            }
        }

        self.sites.push(entry.clone());
        log::info!(
            "Blocked {site} for {duration_minutes} minutes (until {})",
            entry.finish_time
        );

        self.persist().await;
        self.sync_rules().await;
        if let Err(e) = self.scheduler.arm(site, entry.finish_time).await {
            log::error!("Failed to schedule expiry for {site}: {e:#}");
        }

        entry
    }

    /// Remove every entry whose site equals `site`; returns how many went.
    ///
    /// Removing a site that is not blocked succeeds and changes nothing.
    pub async fn remove(&mut self, site: &str) -> usize {
        let before = self.sites.len();
        self.sites.retain(|existing| existing.site != site);
        let removed = before - self.sites.len();

        if removed > 0 {
            log::info!("Unblocked {site}");
        } else {
            log::debug!("Unblock requested for {site}, which is not blocked");
        }

        self.persist().await;
        self.sync_rules().await;
        if let Err(e) = self.scheduler.cancel(site).await {
            log::error!("Failed to cancel expiry for {site}: {e:#}");
        }

        removed
    }

    /// Snapshot of the current list, in insertion order
    #[must_use]
    pub fn list(&self) -> Vec<BlockedSite> {
        self.sites.clone()
    }

    /// Load the persisted list after a restart.
    ///
    /// Entries still in force get their alarm re-armed; entries already past
    /// their finish time are dropped and the pruned list is written back.
    pub async fn restore(&mut self) -> RestoreReport {
        let now = self.clock.now_ms();
        let stored = self.load().await;

        let (active, expired): (Vec<_>, Vec<_>) =
            stored.into_iter().partition(|entry| !entry.is_expired(now));

        for entry in &expired {
            log::info!("Block for {} expired while stopped", entry.site);
            if let Err(e) = self.scheduler.cancel(&entry.site).await {
                log::warn!("Failed to clear stale alarm for {}: {e:#}", entry.site);
            }
        }

        for entry in &active {
            if let Err(e) = self.scheduler.arm(&entry.site, entry.finish_time).await {
                log::error!("Failed to schedule expiry for {}: {e:#}", entry.site);
            }
        }

        let report = RestoreReport {
            restored: active.len(),
            expired: expired.len(),
        };
        self.sites = active;

        if report.expired > 0 {
            self.persist().await;
        }
        self.sync_rules().await;

        log::info!(
            "Restored {} blocked sites ({} expired)",
            report.restored,
            report.expired
        );
        report
    }

    /// Alarm path for `name`; identical to a manual unblock
    pub async fn expire(&mut self, name: &str) -> usize {
        log::info!("Block for {name} expired");
        self.remove(name).await
    }

    /// Expire every site whose alarm is due now; returns how many fired
    pub async fn fire_due(&mut self) -> usize {
        let now = self.clock.now_ms();
        let due = self.scheduler.take_due(now).await;
        let fired = due.len();
        for name in due {
            self.expire(&name).await;
        }
        fired
    }

    /// Earliest pending expiry, epoch ms
    #[must_use]
    pub fn next_deadline(&self) -> Option<i64> {
        self.scheduler.next_deadline()
    }

    /// The installed rule that blocks a top-level navigation to `url`, if any
    pub async fn check(&self, url: &str) -> Option<BlockRule> {
        match self.projector.check(url).await {
            Ok(rule) => rule.filter(|rule| rule.action == RuleAction::Block),
            Err(e) => {
                log::error!("Failed to evaluate rules for {url}: {e:#}");
                None
            }
        }
    }

    async fn load(&self) -> Vec<BlockedSite> {
        match self.storage.get(STORAGE_KEY).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(sites) => sites,
                Err(e) => {
                    log::error!("Persisted block list is unreadable, starting empty: {e}");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                log::error!("Failed to load block list: {e:#}");
                Vec::new()
            }
        }
    }

    async fn persist(&self) {
        let value = match serde_json::to_value(&self.sites) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Failed to encode block list: {e}");
                return;
            }
        };
        if let Err(e) = self.storage.set(STORAGE_KEY, value).await {
            log::error!("Failed to persist block list: {e:#}");
        }
    }

    async fn sync_rules(&self) -> ProjectionOutcome {
        self.projector.project(&self.sites).await
    }
}
