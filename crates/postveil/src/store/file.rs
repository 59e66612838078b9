//! JSON-document rule store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::{RuleStore, StoreDocument};
use crate::error::{Error, Result};
use crate::rules::{AuditCounts, BlockedRule, GlobalSettings};

/// A rule store persisted as a single JSON document on disk.
///
/// Every operation loads the latest document, applies its change, and
/// writes the whole document back, so concurrent cooperative writers never
/// act on a stale copy held across awaits. A missing file reads as an
/// empty document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by the given document path.
    ///
    /// The file itself is created lazily on first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        debug!("rule document at {}", path.display());
        Ok(Self { path })
    }

    /// Path to the persisted document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoreDocument> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreDocument::default());
            }
            Err(source) => {
                return Err(Error::StoreIo {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| Error::StoreDecode {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, mut doc: StoreDocument) -> Result<()> {
        doc.updated_at = Some(Utc::now());
        let bytes = serde_json::to_vec_pretty(&doc)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|source| Error::StoreIo {
                path: self.path.clone(),
                source,
            })
    }
}

#[async_trait]
impl RuleStore for JsonFileStore {
    async fn all_rules(&self) -> Result<Vec<BlockedRule>> {
        Ok(self.load().await?.blocked_rules)
    }

    async fn set_rules(&self, rules: Vec<BlockedRule>) -> Result<()> {
        let mut doc = self.load().await?;
        doc.blocked_rules = rules;
        self.save(doc).await
    }

    async fn increment_audit(&self, phrase: &str) -> Result<()> {
        let mut doc = self.load().await?;
        *doc.audit.entry(phrase.to_string()).or_insert(0) += 1;
        self.save(doc).await
    }

    async fn audit_counts(&self) -> Result<AuditCounts> {
        Ok(self.load().await?.audit)
    }

    async fn global_settings(&self) -> Result<GlobalSettings> {
        Ok(self.load().await?.global_settings)
    }

    async fn set_global_settings(&self, settings: GlobalSettings) -> Result<()> {
        let mut doc = self.load().await?;
        doc.global_settings = settings;
        self.save(doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> (JsonFileStore, PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "postveil_test_{}_{}.json",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_file(&path);
        (JsonFileStore::open(&path).unwrap(), path)
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let (store, path) = temp_store("missing");
        assert!(store.all_rules().await.unwrap().is_empty());
        assert!(store.audit_counts().await.unwrap().is_empty());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_rules_round_trip() {
        let (store, path) = temp_store("round_trip");
        store
            .set_rules(vec![BlockedRule::regex("^RT @").with_overlay()])
            .await
            .unwrap();

        let rules = store.all_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].phrase, "^RT @");
        assert!(rules[0].use_overlay);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_write_preserves_other_sections() {
        let (store, path) = temp_store("sections");
        store.increment_audit("spoiler").await.unwrap();
        store
            .set_rules(vec![BlockedRule::literal("spoiler")])
            .await
            .unwrap();
        store
            .set_global_settings(GlobalSettings {
                username: Some("bob".to_string()),
            })
            .await
            .unwrap();

        // Each write went through a fresh load; nothing was clobbered.
        assert_eq!(store.audit_counts().await.unwrap().get("spoiler"), Some(&1));
        assert_eq!(store.all_rules().await.unwrap().len(), 1);
        assert_eq!(
            store.global_settings().await.unwrap().username.as_deref(),
            Some("bob")
        );
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_malformed_document_is_store_error() {
        let (store, path) = temp_store("malformed");
        std::fs::write(&path, b"not json").unwrap();
        let err = store.all_rules().await.unwrap_err();
        assert!(err.is_store_unavailable());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = std::env::temp_dir().join(format!("postveil_test_{}_nested", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("deep").join("rules.json");

        let store = JsonFileStore::open(&path).unwrap();
        store
            .set_rules(vec![BlockedRule::literal("x")])
            .await
            .unwrap();
        assert!(path.exists());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_updated_at_stamped_on_write() {
        let (store, path) = temp_store("stamp");
        store.increment_audit("x").await.unwrap();
        let doc: StoreDocument =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(doc.updated_at.is_some());
        let _ = std::fs::remove_file(path);
    }
}
