//! Timeline mutation dispatch.
//!
//! The dispatcher owns the single live watch on the timeline container and
//! fans every mutation batch out to the registered observers. It survives
//! single-page-app navigation by re-initializing against the new tree:
//! re-initialization always disconnects the previous watch before a new one
//! attaches, so at most one watch is live at any time and a batch is never
//! dispatched twice.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::dom::{MutationBatch, MutationRecord, Page, Selector, Watch, WatchOptions};
use crate::error::Result;
use crate::wait::wait_for_element;

/// A recipient of timeline mutation batches.
///
/// Observers are registered once during startup wiring and invoked for
/// every batch in registration order. A failing observer never prevents
/// the others from running.
#[async_trait]
pub trait BatchObserver: Send + Sync + fmt::Debug {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Process one mutation batch.
    ///
    /// # Errors
    ///
    /// Errors are logged by the dispatcher and isolated to this observer.
    async fn on_batch(&self, batch: MutationBatch) -> Result<()>;
}

/// Resolves which container to watch for the current route.
pub trait SelectorPolicy: Send + Sync + fmt::Debug {
    /// The container selector for this URL, or `None` when the route has no
    /// timeline to watch.
    fn container_selector(&self, url: &str) -> Option<Selector>;

    /// How to watch the resolved container. Defaults to direct children
    /// only; routes that nest posts deeper watch the subtree.
    fn watch_options(&self, url: &str) -> WatchOptions {
        let _ = url;
        WatchOptions::child_list()
    }
}

/// One route-to-container mapping of a [`RouteTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineRoute {
    /// URL paths served by this container (e.g. `/home`).
    pub paths: Vec<String>,
    /// Fragment of the container's `aria-label` attribute.
    pub container_label: String,
    /// Watch the container subtree instead of direct children.
    #[serde(default)]
    pub deep: bool,
}

/// Route-driven selector policy.
///
/// Maps a URL path to the timeline container of that listing page; the
/// container is located by its `aria-label` and the position-anchored
/// wrapper div inside it.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<TimelineRoute>,
}

impl RouteTable {
    /// Build a table from route entries.
    #[must_use]
    pub fn new(routes: Vec<TimelineRoute>) -> Self {
        Self { routes }
    }

    fn route_for(&self, url: &str) -> Option<&TimelineRoute> {
        let path = url_path(url);
        self.routes
            .iter()
            .find(|r| r.paths.iter().any(|p| p == path))
    }
}

impl SelectorPolicy for RouteTable {
    fn container_selector(&self, url: &str) -> Option<Selector> {
        let route = self.route_for(url)?;
        Some(
            Selector::any()
                .attr_contains("aria-label", &route.container_label)
                .child(Selector::tag("div").attr_starts_with("style", "position: relative")),
        )
    }

    fn watch_options(&self, url: &str) -> WatchOptions {
        match self.route_for(url) {
            Some(route) if route.deep => WatchOptions::subtree(),
            _ => WatchOptions::child_list(),
        }
    }
}

/// The path component of a URL, without query or fragment.
pub(crate) fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    let rest = &rest[..end];
    rest.find('/').map_or("/", |idx| &rest[idx..])
}

#[derive(Debug)]
struct LiveWatch {
    watch: Watch,
    stop: Arc<AtomicBool>,
    _task: JoinHandle<()>,
}

/// Owns the single live timeline watch and fans batches out to observers.
#[derive(Debug)]
pub struct MutationDispatcher {
    page: Page,
    policy: Arc<dyn SelectorPolicy>,
    observers: Mutex<Vec<Arc<dyn BatchObserver>>>,
    live: tokio::sync::Mutex<Option<LiveWatch>>,
}

impl MutationDispatcher {
    /// Create a dispatcher for the given page and selector policy.
    #[must_use]
    pub fn new(page: Page, policy: Arc<dyn SelectorPolicy>) -> Self {
        Self {
            page,
            policy,
            observers: Mutex::new(Vec::new()),
            live: tokio::sync::Mutex::new(None),
        }
    }

    /// Register an observer. Order of registration is dispatch order; no
    /// de-duplication is performed.
    pub fn register_observer(&self, observer: Arc<dyn BatchObserver>) {
        self.observers
            .lock()
            .expect("observer list poisoned")
            .push(observer);
    }

    /// Attach to the timeline container for the current route.
    ///
    /// Disconnects any previously live watch first, then watches the new
    /// container and scans its existing children once through the normal
    /// fan-out path. Returns `false` without attaching when the route has
    /// no container, or when the page navigated away while the container
    /// was being awaited.
    ///
    /// The wait for the container is unbounded, like every element wait.
    pub async fn initialize(&self) -> bool {
        let url = self.page.url();
        let Some(selector) = self.policy.container_selector(&url) else {
            debug!(url = %url, "no timeline container for this route");
            return false;
        };

        let container = wait_for_element(&self.page, &selector, None).await;
        if self.page.url() != url {
            // Navigated away while waiting; the navigation action for the
            // new route owns re-initialization now.
            debug!(url = %url, "navigation superseded this initialization");
            return false;
        }

        let opts = self.policy.watch_options(&url);
        let Ok((watch, mut rx)) = self.page.watch(&container, opts) else {
            return false;
        };

        let observers = self.snapshot();
        let stop = Arc::new(AtomicBool::new(false));
        let task = {
            let observers = observers.clone();
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                while let Some(batch) = rx.recv().await {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    dispatch_batch(&observers, batch).await;
                }
            })
        };

        {
            let mut live = self.live.lock().await;
            if let Some(prev) = live.take() {
                prev.stop.store(true, Ordering::SeqCst);
                prev.watch.disconnect();
                debug!("disconnected previous timeline watch");
            }
            *live = Some(LiveWatch {
                watch,
                stop,
                _task: task,
            });
        }
        info!(url = %url, container = %container, "timeline watch attached");

        // Posts already present before the watch attached get one direct
        // scan through the same fan-out path.
        let existing = container.children();
        if !existing.is_empty() {
            let batch = MutationBatch {
                records: vec![MutationRecord {
                    target: container,
                    added: existing,
                    removed: Vec::new(),
                }],
            };
            dispatch_batch(&observers, batch).await;
        }
        true
    }

    /// Disconnect the live watch, if any. Idempotent.
    ///
    /// Work already dispatched keeps running to completion, but batches not
    /// yet dispatched are dropped.
    pub async fn close_mutators(&self) {
        let mut live = self.live.lock().await;
        if let Some(prev) = live.take() {
            prev.stop.store(true, Ordering::SeqCst);
            prev.watch.disconnect();
            info!("timeline watch closed");
        }
    }

    /// Whether a timeline watch is currently live.
    pub async fn is_open(&self) -> bool {
        self.live.lock().await.is_some()
    }

    fn snapshot(&self) -> Vec<Arc<dyn BatchObserver>> {
        self.observers
            .lock()
            .expect("observer list poisoned")
            .clone()
    }
}

/// Fan one batch out to all observers.
///
/// Observers start in registration order and run concurrently; one
/// observer's failure (error or panic) never blocks the others.
async fn dispatch_batch(observers: &[Arc<dyn BatchObserver>], batch: MutationBatch) {
    let mut tasks = JoinSet::new();
    for observer in observers {
        let observer = Arc::clone(observer);
        let batch = batch.clone();
        tasks.spawn(async move { (observer.name(), observer.on_batch(batch).await) });
    }
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Err(err))) => {
                error!(observer = name, error = %err, "observer failed on batch");
            }
            Ok((_, Ok(()))) => {}
            Err(join_err) => {
                error!(error = %join_err, "observer panicked on batch");
            }
        }
    }
}
