//! Single-shot waiting for an element to appear.
//!
//! The dispatcher and navigation actions use this to locate containers that
//! a single-page app renders asynchronously after navigation.

use tracing::trace;

use crate::dom::{Element, Page, Selector, WatchOptions};

/// Resolve with the first element matching `selector` under `root`
/// (the page body when `root` is `None`).
///
/// Resolves immediately, without installing a watch, when a match already
/// exists. Otherwise a temporary subtree watch is installed and torn down
/// the moment a match appears. Concurrent calls with the same selector are
/// independent; each installs its own watch and resolves once.
///
/// This future never completes if no match ever appears; callers that need
/// bounded waiting wrap it in `tokio::time::timeout`.
pub async fn wait_for_element(page: &Page, selector: &Selector, root: Option<&Element>) -> Element {
    let root = root.cloned().unwrap_or_else(|| page.root());

    if let Some(found) = root.query(selector) {
        return found;
    }

    trace!(selector = %selector, "waiting for element");
    let Ok((watch, mut rx)) = page.watch(&root, WatchOptions::subtree()) else {
        // Root detached: nothing under it can ever match.
        return std::future::pending().await;
    };

    // The match may have landed between the query and the watch attach.
    if let Some(found) = root.query(selector) {
        watch.disconnect();
        return found;
    }

    while rx.recv().await.is_some() {
        if let Some(found) = root.query(selector) {
            watch.disconnect();
            trace!(selector = %selector, element = %found, "element appeared");
            return found;
        }
    }

    // The page itself is gone; by contract the wait stays pending.
    std::future::pending().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::dom::NodeSpec;

    fn timeline_selector() -> Selector {
        Selector::any().attr_contains("aria-label", "Home Timeline")
    }

    #[tokio::test]
    async fn test_resolves_immediately_when_present() {
        let page = Page::new("x");
        let timeline = page
            .root()
            .append_child(NodeSpec::new("div").attr("aria-label", "Home Timeline"))
            .unwrap();

        let found = wait_for_element(&page, &timeline_selector(), None).await;
        assert_eq!(found, timeline);
    }

    #[tokio::test]
    async fn test_resolves_when_element_appears_later() {
        let page = Page::new("x");
        let waiter = {
            let page = page.clone();
            tokio::spawn(async move { wait_for_element(&page, &timeline_selector(), None).await })
        };

        // Let the waiter attach its watch first.
        tokio::task::yield_now().await;
        let timeline = page
            .root()
            .append_child(NodeSpec::new("div").attr("aria-label", "Home Timeline"))
            .unwrap();

        let found = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait should resolve")
            .unwrap();
        assert_eq!(found, timeline);
    }

    #[tokio::test]
    async fn test_pends_while_absent() {
        let page = Page::new("x");
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            wait_for_element(&page, &timeline_selector(), None),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scoped_to_root() {
        let page = Page::new("x");
        let section = page.root().append_child(NodeSpec::new("section")).unwrap();
        // Matching element exists outside the search root.
        page.root()
            .append_child(NodeSpec::new("div").attr("aria-label", "Home Timeline"))
            .unwrap();

        let result = tokio::time::timeout(
            Duration::from_millis(50),
            wait_for_element(&page, &timeline_selector(), Some(&section)),
        )
        .await;
        assert!(result.is_err());

        let inside = section
            .append_child(NodeSpec::new("div").attr("aria-label", "Home Timeline"))
            .unwrap();
        let found = wait_for_element(&page, &timeline_selector(), Some(&section)).await;
        assert_eq!(found, inside);
    }

    #[tokio::test]
    async fn test_concurrent_waits_resolve_independently() {
        let page = Page::new("x");
        let w1 = {
            let page = page.clone();
            tokio::spawn(async move { wait_for_element(&page, &timeline_selector(), None).await })
        };
        let w2 = {
            let page = page.clone();
            tokio::spawn(async move { wait_for_element(&page, &timeline_selector(), None).await })
        };

        tokio::task::yield_now().await;
        let timeline = page
            .root()
            .append_child(NodeSpec::new("div").attr("aria-label", "Home Timeline"))
            .unwrap();

        for waiter in [w1, w2] {
            let found = tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("wait should resolve")
                .unwrap();
            assert_eq!(found, timeline);
        }
    }
}
