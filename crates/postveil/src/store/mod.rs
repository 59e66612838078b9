//! Rule persistence behind an opaque async interface.
//!
//! The engine treats rule storage as an external key-value collaborator: a
//! single document holding the ordered rule list, the viewer's settings,
//! and the audit counters. Matching passes re-read the store every batch so
//! edits take effect immediately, and every mutating operation loads the
//! latest stored document right before changing it, keeping read-modify-
//! write sequences short.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rules::{AuditCounts, BlockedRule, GlobalSettings};

/// The single persisted document, mirroring one key-value entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    /// Ordered rule list; order is evaluation priority.
    pub blocked_rules: Vec<BlockedRule>,
    /// Per-phrase cumulative hide counts.
    pub audit: AuditCounts,
    /// Viewer-wide settings.
    pub global_settings: GlobalSettings,
    /// When the document was last written.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Async access to the persisted rule document.
#[async_trait]
pub trait RuleStore: Send + Sync + std::fmt::Debug {
    /// Read the ordered rule list.
    async fn all_rules(&self) -> Result<Vec<BlockedRule>>;

    /// Replace the whole rule list.
    async fn set_rules(&self, rules: Vec<BlockedRule>) -> Result<()>;

    /// Record one hide for the given phrase.
    async fn increment_audit(&self, phrase: &str) -> Result<()>;

    /// Read all audit counters.
    async fn audit_counts(&self) -> Result<AuditCounts>;

    /// Read the viewer's settings.
    async fn global_settings(&self) -> Result<GlobalSettings>;

    /// Replace the viewer's settings.
    async fn set_global_settings(&self, settings: GlobalSettings) -> Result<()>;

    /// Insert a rule, or replace the rule with the same phrase (last write
    /// wins). Keeps list order for replaced rules; new rules append.
    async fn add_rule(&self, rule: BlockedRule) -> Result<()> {
        let mut rules = self.all_rules().await?;
        match rules.iter_mut().find(|r| r.phrase == rule.phrase) {
            Some(existing) => *existing = rule,
            None => rules.push(rule),
        }
        self.set_rules(rules).await
    }

    /// Remove the rule with the given phrase. Returns whether one existed.
    async fn remove_rule(&self, phrase: &str) -> Result<bool> {
        let mut rules = self.all_rules().await?;
        let before = rules.len();
        rules.retain(|r| r.phrase != phrase);
        let removed = rules.len() != before;
        if removed {
            self.set_rules(rules).await?;
        }
        Ok(removed)
    }

    /// Look up a rule by its phrase.
    async fn rule(&self, phrase: &str) -> Result<Option<BlockedRule>> {
        Ok(self
            .all_rules()
            .await?
            .into_iter()
            .find(|r| r.phrase == phrase))
    }

    /// Whether a rule with the given phrase exists.
    async fn has_rule(&self, phrase: &str) -> Result<bool> {
        Ok(self.rule(phrase).await?.is_some())
    }
}
