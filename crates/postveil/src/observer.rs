//! The post-hiding observer.
//!
//! Registered with the dispatcher, this observer turns mutation batches
//! into hide/overlay side effects: it re-reads the rule store every batch
//! so just-edited rules apply immediately, matches each newly added post,
//! applies the rule's treatment, and records one audit increment per hidden
//! element. Apart from the regex cache it keeps no state across batches.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::dispatcher::BatchObserver;
use crate::dom::{Element, MutationBatch, Selector};
use crate::error::Result;
use crate::matcher::{MatchOutcome, Matcher};
use crate::rules::BlockedRule;
use crate::store::RuleStore;

/// How post fields are located inside an added element.
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    /// Selector for body text nodes under a post.
    pub body_text: Selector,
    /// Selector for the author handle node under a post.
    pub author_handle: Selector,
}

impl ExtractionRules {
    /// Build extraction selectors from `data-testid` marker values.
    #[must_use]
    pub fn from_markers(body_marker: &str, author_marker: &str) -> Self {
        Self {
            body_text: Selector::any().attr("data-testid", body_marker),
            author_handle: Selector::any().attr("data-testid", author_marker),
        }
    }
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self::from_markers("post-text", "author-handle")
    }
}

/// The overlay label shown for a rule's phrase.
#[must_use]
pub fn overlay_label(prefix: &str, phrase: &str) -> String {
    format!("{prefix} \"{phrase}\"")
}

/// Hides posts matched by the stored rules.
#[derive(Debug)]
pub struct PostObserver {
    store: Arc<dyn RuleStore>,
    extraction: ExtractionRules,
    label_prefix: String,
    matcher: Matcher,
}

impl PostObserver {
    /// Default overlay label prefix.
    pub const DEFAULT_LABEL_PREFIX: &'static str = "Hidden by";

    /// Create an observer reading rules from the given store.
    #[must_use]
    pub fn new(store: Arc<dyn RuleStore>, extraction: ExtractionRules) -> Self {
        Self {
            store,
            extraction,
            label_prefix: Self::DEFAULT_LABEL_PREFIX.to_string(),
            matcher: Matcher::new(),
        }
    }

    /// Override the overlay label prefix.
    #[must_use]
    pub fn with_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.label_prefix = prefix.into();
        self
    }

    /// Extract candidates from one element and decide which rule, if any,
    /// claims it.
    fn evaluate_element(
        &self,
        element: &Element,
        rules: &[BlockedRule],
        settings: &crate::rules::GlobalSettings,
    ) -> MatchOutcome {
        let author = element
            .query(&self.extraction.author_handle)
            .map(|el| el.text_content());
        let bodies: Vec<String> = element
            .query_all(&self.extraction.body_text)
            .iter()
            .map(Element::text_content)
            .collect();
        if author.is_none() && bodies.is_empty() {
            return MatchOutcome::NoMatch;
        }
        self.matcher
            .evaluate(rules, settings, author.as_deref(), &bodies)
    }

    /// Mark and visually hide one element under the given rule.
    fn apply_treatment(&self, rule: &BlockedRule, element: &Element) -> Result<()> {
        // Mark first: once matched, the element is never reprocessed even
        // if the treatment below re-triggers observation.
        element.set_marked(true)?;
        if rule.use_overlay {
            element.install_overlay(&overlay_label(&self.label_prefix, &rule.phrase))?;
        } else {
            element.hide()?;
        }
        debug!(phrase = %rule.phrase, element = %element, "post hidden");
        Ok(())
    }
}

#[async_trait]
impl BatchObserver for PostObserver {
    fn name(&self) -> &'static str {
        "post-observer"
    }

    async fn on_batch(&self, batch: MutationBatch) -> Result<()> {
        // Fresh read every batch; a failure here means no hiding at all for
        // this batch rather than hiding on stale rule data.
        let rules = self.store.all_rules().await?;
        if rules.is_empty() {
            return Ok(());
        }
        let settings = self.store.global_settings().await?;

        // Group matched elements by the rule that claimed them.
        let mut groups: Vec<Vec<Element>> = vec![Vec::new(); rules.len()];
        for element in batch.added() {
            if element.is_marked() {
                continue;
            }
            match self.evaluate_element(element, &rules, &settings) {
                MatchOutcome::Rule(idx) => groups[idx].push(element.clone()),
                MatchOutcome::Exempt | MatchOutcome::NoMatch => {}
            }
        }

        // Treatments apply in order; the audit writes for all groups run
        // concurrently and the batch completes once every write settles.
        let mut writes = JoinSet::new();
        for (idx, elements) in groups.into_iter().enumerate() {
            let rule = &rules[idx];
            for element in elements {
                if let Err(err) = self.apply_treatment(rule, &element) {
                    warn!(phrase = %rule.phrase, error = %err, "failed to hide post");
                    continue;
                }
                let store = Arc::clone(&self.store);
                let phrase = rule.phrase.clone();
                writes.spawn(async move { store.increment_audit(&phrase).await });
            }
        }
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok(Err(err)) => warn!(error = %err, "audit increment failed"),
                Ok(Ok(())) => {}
                Err(join_err) => warn!(error = %join_err, "audit task panicked"),
            }
        }
        Ok(())
    }
}
