//! Startup wiring.
//!
//! Every component is constructed explicitly here and handed its
//! collaborators by reference; there are no process-wide singletons or
//! implicit registration side effects. The wiring registers the post
//! observer with the dispatcher and the navigation actions with the
//! interceptor, then starts both.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::config::Config;
use crate::dispatcher::{url_path, MutationDispatcher, RouteTable};
use crate::dom::{Page, Selector};
use crate::error::Result;
use crate::interceptor::{NavigationAction, NavigationInterceptor};
use crate::observer::{ExtractionRules, PostObserver};
use crate::settings::{SettingsController, UiBuilder};
use crate::store::RuleStore;
use crate::wait::wait_for_element;

/// Re-attaches the timeline dispatcher after every navigation.
#[derive(Debug)]
struct ReattachTimeline {
    dispatcher: Arc<MutationDispatcher>,
}

#[async_trait]
impl NavigationAction for ReattachTimeline {
    fn name(&self) -> &'static str {
        "reattach-timeline"
    }

    async fn run(&self, _url: &str) -> Result<()> {
        self.dispatcher.initialize().await;
        Ok(())
    }
}

/// Injects the settings entry point when the settings route renders.
#[derive(Debug)]
struct InjectSettingsEntry {
    page: Page,
    ui: Arc<dyn UiBuilder>,
    settings_path: String,
    section_selector: Selector,
    section_wait: Duration,
}

#[async_trait]
impl NavigationAction for InjectSettingsEntry {
    fn name(&self) -> &'static str {
        "inject-settings-entry"
    }

    async fn run(&self, url: &str) -> Result<()> {
        if url_path(url) != self.settings_path {
            return Ok(());
        }
        // The section renders asynchronously; bound the wait so a markup
        // change on the settings page cannot wedge the action queue.
        let section = tokio::time::timeout(
            self.section_wait,
            wait_for_element(&self.page, &self.section_selector, None),
        )
        .await;
        let Ok(section) = section else {
            debug!(selector = %self.section_selector, "settings section never rendered");
            return Ok(());
        };
        if let Some(anchor) = self.ui.render_settings_entry_point(&section)? {
            debug!(anchor = %anchor, "settings entry point injected");
        }
        Ok(())
    }
}

/// A fully wired engine instance.
#[derive(Debug)]
pub struct App {
    page: Page,
    store: Arc<dyn RuleStore>,
    dispatcher: Arc<MutationDispatcher>,
    interceptor: Arc<NavigationInterceptor>,
    settings: Arc<SettingsController>,
}

impl App {
    /// Wire the engine against a page, a rule store, and a host UI.
    #[must_use]
    pub fn new(
        page: Page,
        store: Arc<dyn RuleStore>,
        ui: Arc<dyn UiBuilder>,
        config: &Config,
    ) -> Self {
        let policy = Arc::new(RouteTable::new(config.routes.timelines.clone()));
        let dispatcher = Arc::new(MutationDispatcher::new(page.clone(), policy));

        let observer = PostObserver::new(
            Arc::clone(&store),
            ExtractionRules::from_markers(
                &config.engine.body_text_marker,
                &config.engine.author_handle_marker,
            ),
        )
        .with_label_prefix(&config.engine.overlay_label_prefix);
        dispatcher.register_observer(Arc::new(observer));

        let interceptor = Arc::new(NavigationInterceptor::new(page.clone()));
        interceptor.add_action(Arc::new(ReattachTimeline {
            dispatcher: Arc::clone(&dispatcher),
        }));
        interceptor.add_action(Arc::new(InjectSettingsEntry {
            page: page.clone(),
            ui,
            settings_path: config.routes.settings_path.clone(),
            section_selector: config.settings_section_selector(),
            section_wait: config.settings_wait(),
        }));

        let settings = Arc::new(SettingsController::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
        ));

        Self {
            page,
            store,
            dispatcher,
            interceptor,
            settings,
        }
    }

    /// Start observing: attach the navigation watch, then attach the
    /// timeline watch if the current route has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the navigation watch cannot be attached.
    pub async fn start(&self) -> Result<()> {
        self.interceptor.start()?;
        self.dispatcher.initialize().await;
        Ok(())
    }

    /// The page this engine runs against.
    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// The rule store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// The timeline dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<MutationDispatcher> {
        &self.dispatcher
    }

    /// The settings controller backing the editor.
    #[must_use]
    pub fn settings(&self) -> &Arc<SettingsController> {
        &self.settings
    }
}
