//! Single-page-app navigation detection.
//!
//! The host application never reloads the page, so URL changes are detected
//! through tree mutations: one long-lived subtree watch on the body
//! compares the page URL against the last-seen value on every batch. When
//! it differs, every registered action runs in registration order,
//! sequentially awaited. Mutations that are not navigations cost one string
//! comparison and nothing else.

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::dom::{Page, Watch, WatchOptions};
use crate::error::Result;

/// Work to perform after a navigation.
///
/// Actions are registered once during startup wiring; there is no removal.
/// An action that fails is reported through the log and never prevents the
/// remaining actions, or later navigations, from running.
#[async_trait]
pub trait NavigationAction: Send + Sync + fmt::Debug {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Run against the URL navigated to.
    ///
    /// # Errors
    ///
    /// Errors are logged by the interceptor and isolated to this action.
    async fn run(&self, url: &str) -> Result<()>;
}

#[derive(Debug)]
struct Running {
    _watch: Watch,
    _task: JoinHandle<()>,
}

/// Watches the page for single-page-app navigations.
#[derive(Debug)]
pub struct NavigationInterceptor {
    page: Page,
    actions: Mutex<Vec<Arc<dyn NavigationAction>>>,
    running: Mutex<Option<Running>>,
}

impl NavigationInterceptor {
    /// Create an interceptor for the given page.
    #[must_use]
    pub fn new(page: Page) -> Self {
        Self {
            page,
            actions: Mutex::new(Vec::new()),
            running: Mutex::new(None),
        }
    }

    /// Register an action to run after every navigation. Order of
    /// registration is execution order.
    pub fn add_action(&self, action: Arc<dyn NavigationAction>) {
        self.actions
            .lock()
            .expect("action list poisoned")
            .push(action);
    }

    /// Attach the long-lived body watch. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be watched.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().expect("interceptor state poisoned");
        if running.is_some() {
            return Ok(());
        }

        let (watch, mut rx) = self.page.watch(&self.page.root(), WatchOptions::subtree())?;
        let page = self.page.clone();
        let actions = self
            .actions
            .lock()
            .expect("action list poisoned")
            .clone();

        let task = tokio::spawn(async move {
            let mut last_href = page.url();
            while rx.recv().await.is_some() {
                let href = page.url();
                if href == last_href {
                    continue;
                }
                last_href = href.clone();
                info!(url = %href, "navigation detected");
                for action in &actions {
                    if let Err(err) = action.run(&href).await {
                        error!(action = action.name(), error = %err, "navigation action failed");
                    }
                }
            }
            debug!("navigation watch ended");
        });

        *running = Some(Running {
            _watch: watch,
            _task: task,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dom::NodeSpec;
    use crate::error::Error;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[derive(Debug)]
    struct Recorder {
        tag: &'static str,
        log: Arc<Mutex<Vec<(String, String)>>>,
    }

    #[async_trait]
    impl NavigationAction for Recorder {
        fn name(&self) -> &'static str {
            self.tag
        }

        async fn run(&self, url: &str) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push((self.tag.to_string(), url.to_string()));
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingAction;

    #[async_trait]
    impl NavigationAction for FailingAction {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(&self, _url: &str) -> Result<()> {
            Err(Error::internal("intentional"))
        }
    }

    fn navigate(page: &Page, url: &str) {
        // An SPA navigation: the URL changes and the tree mutates.
        page.set_url(url);
        page.root()
            .append_child(NodeSpec::new("div").attr("data-page", url))
            .unwrap();
    }

    #[tokio::test]
    async fn test_actions_run_on_url_change_in_order() {
        let page = Page::new("https://example.com/home");
        let interceptor = NavigationInterceptor::new(page.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        interceptor.add_action(Arc::new(Recorder {
            tag: "first",
            log: log.clone(),
        }));
        interceptor.add_action(Arc::new(Recorder {
            tag: "second",
            log: log.clone(),
        }));
        interceptor.start().unwrap();

        navigate(&page, "https://example.com/explore");
        settle().await;

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                (
                    "first".to_string(),
                    "https://example.com/explore".to_string()
                ),
                (
                    "second".to_string(),
                    "https://example.com/explore".to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_unrelated_mutations_do_not_trigger() {
        let page = Page::new("https://example.com/home");
        let interceptor = NavigationInterceptor::new(page.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        interceptor.add_action(Arc::new(Recorder {
            tag: "only",
            log: log.clone(),
        }));
        interceptor.start().unwrap();

        // Timeline content changes without a navigation.
        page.root().append_child(NodeSpec::new("article")).unwrap();
        page.root().append_child(NodeSpec::new("article")).unwrap();
        settle().await;

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_action_does_not_stop_the_rest() {
        let page = Page::new("https://example.com/home");
        let interceptor = NavigationInterceptor::new(page.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        interceptor.add_action(Arc::new(FailingAction));
        interceptor.add_action(Arc::new(Recorder {
            tag: "after",
            log: log.clone(),
        }));
        interceptor.start().unwrap();

        navigate(&page, "https://example.com/a");
        settle().await;
        navigate(&page, "https://example.com/b");
        settle().await;

        // The failing action never blocked the later one, and the watch
        // kept running across navigations.
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let page = Page::new("https://example.com/home");
        let interceptor = NavigationInterceptor::new(page.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        interceptor.add_action(Arc::new(Recorder {
            tag: "only",
            log: log.clone(),
        }));
        interceptor.start().unwrap();
        interceptor.start().unwrap();

        navigate(&page, "https://example.com/x");
        settle().await;

        // One watch, one invocation.
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_consecutive_navigations_each_fire() {
        let page = Page::new("https://example.com/home");
        let interceptor = NavigationInterceptor::new(page.clone());
        let log = Arc::new(Mutex::new(Vec::new()));
        interceptor.add_action(Arc::new(Recorder {
            tag: "only",
            log: log.clone(),
        }));
        interceptor.start().unwrap();

        navigate(&page, "https://example.com/a");
        settle().await;
        navigate(&page, "https://example.com/b");
        settle().await;

        let urls: Vec<String> = log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, url)| url.clone())
            .collect();
        assert_eq!(
            urls,
            vec!["https://example.com/a", "https://example.com/b"]
        );
    }
}
