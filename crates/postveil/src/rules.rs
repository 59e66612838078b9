//! Core rule types for postveil.
//!
//! This module defines the data structures describing what to hide and how:
//! blocking rules, the viewer's global settings, and the audit counters that
//! record how often each rule has fired.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single blocking directive.
///
/// Rules are kept as an ordered list; order is evaluation priority and the
/// first matching rule wins. The phrase is the unique key — saving a rule
/// with an existing phrase replaces it (last write wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockedRule {
    /// Literal substring or regular-expression source to match.
    pub phrase: String,

    /// Interpret `phrase` as a regular expression instead of a literal.
    pub use_regex: bool,

    /// Replace the post content with a reveal-on-click overlay instead of
    /// hiding the post entirely.
    pub use_overlay: bool,

    /// Also apply this rule to the post author's handle, not just body text.
    pub filter_username: bool,
}

impl Default for BlockedRule {
    fn default() -> Self {
        Self {
            phrase: String::new(),
            use_regex: false,
            use_overlay: false,
            filter_username: false,
        }
    }
}

impl BlockedRule {
    /// Create a literal substring rule with full-hide treatment.
    #[must_use]
    pub fn literal(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            ..Self::default()
        }
    }

    /// Create a regular-expression rule with full-hide treatment.
    #[must_use]
    pub fn regex(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
            use_regex: true,
            ..Self::default()
        }
    }

    /// Switch this rule to overlay treatment.
    #[must_use]
    pub fn with_overlay(mut self) -> Self {
        self.use_overlay = true;
        self
    }

    /// Also match against the post author's handle.
    #[must_use]
    pub fn with_username_filter(mut self) -> Self {
        self.filter_username = true;
        self
    }
}

/// Viewer-wide settings read on every matching pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalSettings {
    /// The viewing user's own handle. Posts authored by this handle are
    /// exempt from all rules.
    pub username: Option<String>,
}

impl GlobalSettings {
    /// Check whether the given author handle belongs to the viewer.
    ///
    /// Handles are compared without a leading `@` and case-insensitively.
    #[must_use]
    pub fn is_own_handle(&self, handle: &str) -> bool {
        let Some(own) = self.username.as_deref() else {
            return false;
        };
        normalize_handle(handle).eq_ignore_ascii_case(normalize_handle(own))
    }
}

/// Strip the conventional `@` prefix from a handle.
fn normalize_handle(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}

/// Cumulative per-rule hide counts, keyed by rule phrase.
///
/// Counters only ever increase and survive rule deletion; a counter for a
/// phrase with no surviving rule is harmless.
pub type AuditCounts = BTreeMap<String, u64>;
