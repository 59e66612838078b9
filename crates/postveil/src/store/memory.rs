//! In-process rule store.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use super::{RuleStore, StoreDocument};
use crate::error::Result;
use crate::rules::{AuditCounts, BlockedRule, GlobalSettings};

/// A rule store held entirely in memory.
///
/// Useful for tests and for embedding the engine without durable
/// persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    doc: Mutex<StoreDocument>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with rules.
    #[must_use]
    pub fn with_rules(rules: Vec<BlockedRule>) -> Self {
        let store = Self::new();
        store.lock().blocked_rules = rules;
        store
    }

    /// Snapshot the whole document.
    #[must_use]
    pub fn document(&self) -> StoreDocument {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreDocument> {
        self.doc.lock().expect("store document poisoned")
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn all_rules(&self) -> Result<Vec<BlockedRule>> {
        Ok(self.lock().blocked_rules.clone())
    }

    async fn set_rules(&self, rules: Vec<BlockedRule>) -> Result<()> {
        let mut doc = self.lock();
        doc.blocked_rules = rules;
        doc.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn increment_audit(&self, phrase: &str) -> Result<()> {
        let mut doc = self.lock();
        *doc.audit.entry(phrase.to_string()).or_insert(0) += 1;
        doc.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn audit_counts(&self) -> Result<AuditCounts> {
        Ok(self.lock().audit.clone())
    }

    async fn global_settings(&self) -> Result<GlobalSettings> {
        Ok(self.lock().global_settings.clone())
    }

    async fn set_global_settings(&self, settings: GlobalSettings) -> Result<()> {
        let mut doc = self.lock();
        doc.global_settings = settings;
        doc.updated_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_store() {
        let store = MemoryStore::new();
        assert!(store.all_rules().await.unwrap().is_empty());
        assert!(store.audit_counts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_and_read_rules() {
        let store = MemoryStore::new();
        store
            .set_rules(vec![BlockedRule::literal("spoiler")])
            .await
            .unwrap();
        let rules = store.all_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].phrase, "spoiler");
        assert!(store.document().updated_at.is_some());
    }

    #[tokio::test]
    async fn test_add_rule_upserts_by_phrase() {
        let store = MemoryStore::with_rules(vec![
            BlockedRule::literal("first"),
            BlockedRule::literal("second"),
        ]);

        // Replacing keeps the rule's position.
        store
            .add_rule(BlockedRule::literal("first").with_overlay())
            .await
            .unwrap();
        let rules = store.all_rules().await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].phrase, "first");
        assert!(rules[0].use_overlay);

        // A new phrase appends.
        store.add_rule(BlockedRule::literal("third")).await.unwrap();
        assert_eq!(store.all_rules().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_remove_rule() {
        let store = MemoryStore::with_rules(vec![BlockedRule::literal("gone")]);
        assert!(store.remove_rule("gone").await.unwrap());
        assert!(!store.remove_rule("gone").await.unwrap());
        assert!(store.all_rules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rule_lookup() {
        let store = MemoryStore::with_rules(vec![BlockedRule::literal("present")]);
        assert!(store.has_rule("present").await.unwrap());
        assert!(!store.has_rule("absent").await.unwrap());
        assert_eq!(
            store.rule("present").await.unwrap().unwrap().phrase,
            "present"
        );
    }

    #[tokio::test]
    async fn test_increment_audit() {
        let store = MemoryStore::new();
        store.increment_audit("spoiler").await.unwrap();
        store.increment_audit("spoiler").await.unwrap();
        store.increment_audit("other").await.unwrap();

        let counts = store.audit_counts().await.unwrap();
        assert_eq!(counts.get("spoiler"), Some(&2));
        assert_eq!(counts.get("other"), Some(&1));
    }

    #[tokio::test]
    async fn test_audit_survives_rule_removal() {
        let store = MemoryStore::with_rules(vec![BlockedRule::literal("spoiler")]);
        store.increment_audit("spoiler").await.unwrap();
        store.remove_rule("spoiler").await.unwrap();
        assert_eq!(store.audit_counts().await.unwrap().get("spoiler"), Some(&1));
    }

    #[tokio::test]
    async fn test_global_settings_round_trip() {
        let store = MemoryStore::new();
        assert!(store.global_settings().await.unwrap().username.is_none());

        store
            .set_global_settings(GlobalSettings {
                username: Some("bob".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(
            store.global_settings().await.unwrap().username.as_deref(),
            Some("bob")
        );
    }
}
