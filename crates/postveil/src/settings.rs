//! The settings-editor boundary.
//!
//! Rendering the editor is the host UI's job; this module owns the save
//! semantics around it: validate the edited rule set, persist it, and open
//! or close the timeline mutators depending on whether any rules remain.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::dispatcher::MutationDispatcher;
use crate::dom::{Element, NodeSpec};
use crate::error::Result;
use crate::matcher::validate_rules;
use crate::rules::{AuditCounts, BlockedRule, GlobalSettings};
use crate::store::RuleStore;

/// Renders the settings surface into the host page.
///
/// Implementations are external collaborators; the engine only asks for the
/// entry point after navigating to the settings route and leaves the editor
/// itself to the host. Editors persist their result through
/// [`SettingsController::save`].
pub trait UiBuilder: Send + Sync + fmt::Debug {
    /// Inject the settings entry point into the given section.
    ///
    /// Idempotent: returns `None` when the entry point is already rendered.
    ///
    /// # Errors
    ///
    /// Returns an error if the section cannot be mutated.
    fn render_settings_entry_point(&self, section: &Element) -> Result<Option<Element>>;

    /// Render the rule editor into the given section.
    ///
    /// # Errors
    ///
    /// Returns an error if the section cannot be mutated.
    fn render_editor(&self, section: &Element) -> Result<Element>;
}

/// A bare-bones [`UiBuilder`] injecting unstyled elements.
///
/// Enough for tests and headless embeddings; real hosts bring their own.
#[derive(Debug, Default)]
pub struct MinimalUi;

impl MinimalUi {
    const LINK_CLASS: &'static str = "postveil-settings-link";
    const EDITOR_CLASS: &'static str = "postveil-editor";
}

impl UiBuilder for MinimalUi {
    fn render_settings_entry_point(&self, section: &Element) -> Result<Option<Element>> {
        let existing = crate::dom::Selector::any().attr("class", Self::LINK_CLASS);
        if section.query(&existing).is_some() {
            return Ok(None);
        }
        let anchor = section.append_child(
            NodeSpec::new("a")
                .attr("class", Self::LINK_CLASS)
                .text("Muted phrases"),
        )?;
        Ok(Some(anchor))
    }

    fn render_editor(&self, section: &Element) -> Result<Element> {
        section.append_child(NodeSpec::new("div").attr("class", Self::EDITOR_CLASS))
    }
}

/// Applies editor saves: validation, persistence, mutator toggling.
#[derive(Debug)]
pub struct SettingsController {
    store: Arc<dyn RuleStore>,
    dispatcher: Arc<MutationDispatcher>,
}

impl SettingsController {
    /// Create a controller over the given store and dispatcher.
    #[must_use]
    pub fn new(store: Arc<dyn RuleStore>, dispatcher: Arc<MutationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Persist an edited rule set and the viewer's settings.
    ///
    /// Every regex phrase is validated first; an invalid phrase aborts the
    /// whole save with nothing persisted. After a successful save the
    /// timeline mutators are closed when the rule list is now empty and
    /// (re)initialized when it is not.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidRule`] naming the offending phrase,
    /// or a store error if persistence fails.
    pub async fn save(&self, rules: Vec<BlockedRule>, settings: GlobalSettings) -> Result<()> {
        validate_rules(&rules)?;

        let empty = rules.is_empty();
        self.store.set_rules(rules).await?;
        self.store.set_global_settings(settings).await?;
        info!(empty, "rule set saved");

        if empty {
            self.dispatcher.close_mutators().await;
        } else {
            self.dispatcher.initialize().await;
        }
        Ok(())
    }

    /// The current rule list, for editor display.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub async fn rules(&self) -> Result<Vec<BlockedRule>> {
        self.store.all_rules().await
    }

    /// The viewer's settings, for editor display.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub async fn settings(&self) -> Result<GlobalSettings> {
        self.store.global_settings().await
    }

    /// Read-only audit counters, for editor display.
    ///
    /// # Errors
    ///
    /// Returns a store error if the read fails.
    pub async fn audit(&self) -> Result<AuditCounts> {
        self.store.audit_counts().await
    }
}
