//! In-process element tree with mutation watching.
//!
//! This module is the platform surface the engine runs against: a tree of
//! elements that can be queried by selector, mutated, and watched for
//! child-list changes. It deliberately mirrors the semantics of a browser
//! document and its mutation observers without depending on one, so the
//! same engine can be driven by any tree-mutation-notifying UI surface.
//!
//! Watchers receive [`MutationBatch`]es over an unbounded channel; one
//! mutating call produces at most one batch per watcher. Disconnecting a
//! watch is idempotent and also happens on drop.

mod selector;

pub use selector::{AttrMatch, Selector};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Identifier of a node within its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

/// What a watcher is notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Report additions and removals of the target's direct children.
    pub child_list: bool,
    /// Extend reporting to the target's whole subtree.
    pub subtree: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            child_list: true,
            subtree: false,
        }
    }
}

impl WatchOptions {
    /// Watch direct children of the target only.
    #[must_use]
    pub fn child_list() -> Self {
        Self::default()
    }

    /// Watch the target's whole subtree.
    #[must_use]
    pub fn subtree() -> Self {
        Self {
            child_list: true,
            subtree: true,
        }
    }
}

/// One child-list change on one target element.
#[derive(Debug, Clone)]
pub struct MutationRecord {
    /// The element whose child list changed.
    pub target: Element,
    /// Elements added to the target.
    pub added: Vec<Element>,
    /// Elements removed from the target.
    pub removed: Vec<Element>,
}

/// One delivery of mutation records, as coalesced by the page.
#[derive(Debug, Clone)]
pub struct MutationBatch {
    /// The records in this batch, in mutation order.
    pub records: Vec<MutationRecord>,
}

impl MutationBatch {
    /// Iterate over every added element in every record, in order.
    pub fn added(&self) -> impl Iterator<Item = &Element> {
        self.records.iter().flat_map(|r| r.added.iter())
    }
}

/// Declarative description of a node to insert.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    tag: String,
    attrs: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<NodeSpec>,
}

impl NodeSpec {
    /// Start a node with the given tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Add an attribute.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Set the node's own text.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Append a child spec.
    #[must_use]
    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// Overlay installed over a hidden element's content.
#[derive(Debug)]
struct OverlayState {
    overlay_node: NodeId,
    displaced: Vec<NodeId>,
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    attrs: HashMap<String, String>,
    text: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Style-level suppression (the display:none equivalent).
    display_hidden: bool,
    /// Idempotence marker: set once an element has been matched and hidden.
    marked: bool,
    overlay: Option<OverlayState>,
}

impl NodeData {
    fn new(tag: String) -> Self {
        Self {
            tag,
            attrs: HashMap::new(),
            text: None,
            parent: None,
            children: Vec::new(),
            display_hidden: false,
            marked: false,
            overlay: None,
        }
    }
}

#[derive(Debug)]
struct Watcher {
    id: u64,
    target: NodeId,
    opts: WatchOptions,
    tx: mpsc::UnboundedSender<MutationBatch>,
}

#[derive(Debug)]
struct PageState {
    nodes: HashMap<NodeId, NodeData>,
    root: NodeId,
    url: String,
    watchers: Vec<Watcher>,
    next_node: u64,
    next_watch: u64,
}

#[derive(Debug)]
struct PageInner {
    state: Mutex<PageState>,
}

/// A change to one target's child list, by node id.
type RecordData = (NodeId, Vec<NodeId>, Vec<NodeId>);

impl PageState {
    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id)
    }

    fn insert_spec(&mut self, parent: Option<NodeId>, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;

        let mut data = NodeData::new(spec.tag);
        data.attrs = spec.attrs.into_iter().collect();
        data.text = spec.text;
        data.parent = parent;
        self.nodes.insert(id, data);

        for child in spec.children {
            self.insert_spec(Some(id), child);
        }

        if let Some(parent) = parent {
            if let Some(parent_data) = self.nodes.get_mut(&parent) {
                parent_data.children.push(id);
            }
        }
        id
    }

    fn is_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        while let Some(parent) = self.node(node).and_then(|n| n.parent) {
            if parent == ancestor {
                return true;
            }
            node = parent;
        }
        false
    }

    fn step_matches(&self, step: &selector::Step, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        step.matches(&node.tag, |name| node.attrs.get(name).cloned())
    }

    fn selector_matches(&self, sel: &Selector, id: NodeId) -> bool {
        let mut steps = sel.chain.iter().rev();
        let Some(last) = steps.next() else {
            return false;
        };
        if !self.step_matches(last, id) {
            return false;
        }
        let mut cur = id;
        for step in steps {
            let Some(parent) = self.node(cur).and_then(|n| n.parent) else {
                return false;
            };
            if !self.step_matches(step, parent) {
                return false;
            }
            cur = parent;
        }
        true
    }

    /// Pre-order search of `root`'s descendants (excluding `root` itself).
    fn query_from(&self, root: NodeId, sel: &Selector, all: &mut Vec<NodeId>, first_only: bool) {
        let Some(node) = self.node(root) else { return };
        for &child in &node.children {
            if self.selector_matches(sel, child) {
                all.push(child);
                if first_only {
                    return;
                }
            }
            self.query_from(child, sel, all, first_only);
            if first_only && !all.is_empty() {
                return;
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else { return };
        if let Some(text) = &node.text {
            out.push_str(text);
        }
        for &child in &node.children {
            self.collect_text(child, out);
        }
    }

    fn watcher_sees(&self, watcher: &Watcher, target: NodeId) -> bool {
        if !watcher.opts.child_list {
            return false;
        }
        watcher.target == target
            || (watcher.opts.subtree && self.is_ancestor(watcher.target, target))
    }

    /// Fan the records out to every watcher that observes them.
    fn deliver(&mut self, page: &Weak<PageInner>, records: &[RecordData]) {
        self.watchers.retain(|w| !w.tx.is_closed());
        for watcher in &self.watchers {
            let matched: Vec<MutationRecord> = records
                .iter()
                .filter(|(target, _, _)| self.watcher_sees(watcher, *target))
                .map(|(target, added, removed)| MutationRecord {
                    target: Element::from_parts(*target, page.clone()),
                    added: added
                        .iter()
                        .map(|id| Element::from_parts(*id, page.clone()))
                        .collect(),
                    removed: removed
                        .iter()
                        .map(|id| Element::from_parts(*id, page.clone()))
                        .collect(),
                })
                .collect();
            if !matched.is_empty() {
                let _ = watcher.tx.send(MutationBatch { records: matched });
            }
        }
    }
}

/// A handle to an in-process page: the element tree, its URL, and the
/// watcher registry.
///
/// Cheap to clone; all clones share the same tree.
#[derive(Debug, Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

impl Page {
    /// Create a page with an empty body and the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let mut nodes = HashMap::new();
        let root = NodeId(0);
        nodes.insert(root, NodeData::new("body".to_string()));
        Self {
            inner: Arc::new(PageInner {
                state: Mutex::new(PageState {
                    nodes,
                    root,
                    url: url.into(),
                    watchers: Vec::new(),
                    next_node: 1,
                    next_watch: 0,
                }),
            }),
        }
    }

    /// The page body element.
    #[must_use]
    pub fn root(&self) -> Element {
        let state = self.lock();
        Element::from_parts(state.root, Arc::downgrade(&self.inner))
    }

    /// The current page URL.
    #[must_use]
    pub fn url(&self) -> String {
        self.lock().url.clone()
    }

    /// Update the page URL.
    ///
    /// A URL change on its own produces no mutation batch; single-page-app
    /// navigation is observed through the tree mutations it causes.
    pub fn set_url(&self, url: impl Into<String>) {
        self.lock().url = url.into();
    }

    /// Find the first element under the body matching the selector.
    #[must_use]
    pub fn query(&self, sel: &Selector) -> Option<Element> {
        self.root().query(sel)
    }

    /// Register a watcher on the target element.
    ///
    /// Batches are delivered through the returned receiver until the watch
    /// is disconnected (explicitly or by drop).
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetachedElement`] if the target no longer exists.
    pub fn watch(
        &self,
        target: &Element,
        opts: WatchOptions,
    ) -> Result<(Watch, mpsc::UnboundedReceiver<MutationBatch>)> {
        let mut state = self.lock();
        if !state.nodes.contains_key(&target.id) {
            return Err(Error::DetachedElement);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.next_watch;
        state.next_watch += 1;
        state.watchers.push(Watcher {
            id,
            target: target.id,
            opts,
            tx,
        });
        Ok((
            Watch {
                id,
                page: Arc::downgrade(&self.inner),
            },
            rx,
        ))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.inner.state.lock().expect("page state poisoned")
    }
}

/// An active mutation watch.
///
/// Disconnecting stops further deliveries; batches already queued on the
/// receiver remain readable. Disconnect is idempotent and also happens when
/// the watch is dropped.
#[derive(Debug)]
pub struct Watch {
    id: u64,
    page: Weak<PageInner>,
}

impl Watch {
    /// Stop observing. Safe to call more than once.
    pub fn disconnect(&self) {
        if let Some(inner) = self.page.upgrade() {
            let mut state = inner.state.lock().expect("page state poisoned");
            state.watchers.retain(|w| w.id != self.id);
        }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// A cheap, cloneable handle to one element of a [`Page`].
///
/// Read accessors on a detached handle (page dropped or node removed from
/// the tree) return empty defaults; mutating calls return
/// [`Error::DetachedElement`].
#[derive(Debug, Clone)]
pub struct Element {
    id: NodeId,
    page: Weak<PageInner>,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.page, &other.page)
    }
}

impl Eq for Element {}

impl Element {
    fn from_parts(id: NodeId, page: Weak<PageInner>) -> Self {
        Self { id, page }
    }

    /// The node identifier of this element.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    fn inner(&self) -> Result<Arc<PageInner>> {
        self.page.upgrade().ok_or(Error::DetachedElement)
    }

    fn read<T: Default>(&self, f: impl FnOnce(&PageState, &NodeData) -> T) -> T {
        let Some(inner) = self.page.upgrade() else {
            return T::default();
        };
        let state = inner.state.lock().expect("page state poisoned");
        match state.node(self.id) {
            Some(node) => f(&state, node),
            None => T::default(),
        }
    }

    /// The element's tag, or an empty string when detached.
    #[must_use]
    pub fn tag(&self) -> String {
        self.read(|_, node| node.tag.clone())
    }

    /// An attribute value, if set.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<String> {
        self.read(|_, node| node.attrs.get(name).cloned())
    }

    /// The element's own text, if set.
    #[must_use]
    pub fn text(&self) -> Option<String> {
        self.read(|_, node| node.text.clone())
    }

    /// The concatenated text of this element and all its descendants.
    #[must_use]
    pub fn text_content(&self) -> String {
        let Some(inner) = self.page.upgrade() else {
            return String::new();
        };
        let state = inner.state.lock().expect("page state poisoned");
        let mut out = String::new();
        state.collect_text(self.id, &mut out);
        out
    }

    /// Direct children, in document order.
    #[must_use]
    pub fn children(&self) -> Vec<Element> {
        self.read(|_, node| {
            node.children
                .iter()
                .map(|id| Element::from_parts(*id, self.page.clone()))
                .collect()
        })
    }

    /// The parent element, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<Element> {
        self.read(|_, node| {
            node.parent
                .map(|id| Element::from_parts(id, self.page.clone()))
        })
    }

    /// Whether the node still exists in its page.
    #[must_use]
    pub fn exists(&self) -> bool {
        let Some(inner) = self.page.upgrade() else {
            return false;
        };
        let state = inner.state.lock().expect("page state poisoned");
        state.nodes.contains_key(&self.id)
    }

    /// Find the first descendant matching the selector.
    #[must_use]
    pub fn query(&self, sel: &Selector) -> Option<Element> {
        let inner = self.page.upgrade()?;
        let state = inner.state.lock().expect("page state poisoned");
        let mut found = Vec::new();
        state.query_from(self.id, sel, &mut found, true);
        found
            .first()
            .map(|id| Element::from_parts(*id, self.page.clone()))
    }

    /// Find all descendants matching the selector, in document order.
    #[must_use]
    pub fn query_all(&self, sel: &Selector) -> Vec<Element> {
        let Some(inner) = self.page.upgrade() else {
            return Vec::new();
        };
        let state = inner.state.lock().expect("page state poisoned");
        let mut found = Vec::new();
        state.query_from(self.id, sel, &mut found, false);
        found
            .into_iter()
            .map(|id| Element::from_parts(id, self.page.clone()))
            .collect()
    }

    /// Append one child described by the spec; delivers one batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetachedElement`] if this element no longer exists.
    pub fn append_child(&self, spec: NodeSpec) -> Result<Element> {
        let added = self.append_children(vec![spec])?;
        added
            .into_iter()
            .next()
            .ok_or_else(|| Error::internal("append_child produced no node"))
    }

    /// Append several children in one coalesced batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetachedElement`] if this element no longer exists.
    pub fn append_children(&self, specs: Vec<NodeSpec>) -> Result<Vec<Element>> {
        let inner = self.inner()?;
        let mut state = inner.state.lock().expect("page state poisoned");
        if !state.nodes.contains_key(&self.id) {
            return Err(Error::DetachedElement);
        }
        let ids: Vec<NodeId> = specs
            .into_iter()
            .map(|spec| state.insert_spec(Some(self.id), spec))
            .collect();
        state.deliver(&self.page, &[(self.id, ids.clone(), Vec::new())]);
        Ok(ids
            .into_iter()
            .map(|id| Element::from_parts(id, self.page.clone()))
            .collect())
    }

    /// Remove a direct child from this element; delivers one batch.
    ///
    /// The removed subtree stays addressable through existing handles but is
    /// no longer attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetachedElement`] if either element no longer
    /// exists, or [`Error::Internal`] if `child` is not a direct child.
    pub fn remove_child(&self, child: &Element) -> Result<()> {
        let inner = self.inner()?;
        let mut state = inner.state.lock().expect("page state poisoned");
        let Some(node) = state.nodes.get_mut(&self.id) else {
            return Err(Error::DetachedElement);
        };
        let Some(pos) = node.children.iter().position(|id| *id == child.id) else {
            return Err(Error::internal("remove_child: not a direct child"));
        };
        node.children.remove(pos);
        if let Some(child_data) = state.nodes.get_mut(&child.id) {
            child_data.parent = None;
        }
        state.deliver(&self.page, &[(self.id, Vec::new(), vec![child.id])]);
        Ok(())
    }

    /// Whether the element carries the hidden marker.
    #[must_use]
    pub fn is_marked(&self) -> bool {
        self.read(|_, node| node.marked)
    }

    /// Set or clear the hidden marker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetachedElement`] if this element no longer exists.
    pub fn set_marked(&self, marked: bool) -> Result<()> {
        self.mutate(|node| node.marked = marked)
    }

    /// Whether the element is style-suppressed.
    #[must_use]
    pub fn is_display_hidden(&self) -> bool {
        self.read(|_, node| node.display_hidden)
    }

    /// Suppress the element's display entirely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetachedElement`] if this element no longer exists.
    pub fn hide(&self) -> Result<()> {
        self.mutate(|node| node.display_hidden = true)
    }

    /// Restore a suppressed element's display.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetachedElement`] if this element no longer exists.
    pub fn show(&self) -> Result<()> {
        self.mutate(|node| node.display_hidden = false)
    }

    /// Whether an overlay currently replaces this element's content.
    #[must_use]
    pub fn has_overlay(&self) -> bool {
        self.read(|_, node| node.overlay.is_some())
    }

    /// The label of the installed overlay, if any.
    #[must_use]
    pub fn overlay_label(&self) -> Option<String> {
        let Some(inner) = self.page.upgrade() else {
            return None;
        };
        let state = inner.state.lock().expect("page state poisoned");
        let overlay_node = state.node(self.id)?.overlay.as_ref()?.overlay_node;
        state.node(overlay_node)?.text.clone()
    }

    /// Replace this element's content with a labelled reveal overlay.
    ///
    /// The original children are preserved and restored by [`Self::click`].
    /// Installing over an existing overlay is a no-op. Delivers one batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetachedElement`] if this element no longer exists.
    pub fn install_overlay(&self, label: &str) -> Result<()> {
        let inner = self.inner()?;
        let mut state = inner.state.lock().expect("page state poisoned");
        let Some(node) = state.nodes.get(&self.id) else {
            return Err(Error::DetachedElement);
        };
        if node.overlay.is_some() {
            return Ok(());
        }

        let displaced = node.children.clone();
        let overlay_spec = NodeSpec::new("button")
            .attr("class", "postveil-overlay")
            .text(label);
        let overlay_node = state.insert_spec(None, overlay_spec);

        for id in &displaced {
            if let Some(child) = state.nodes.get_mut(id) {
                child.parent = None;
            }
        }
        let node = state.nodes.get_mut(&self.id).expect("checked above");
        node.children = vec![overlay_node];
        node.overlay = Some(OverlayState {
            overlay_node,
            displaced: displaced.clone(),
        });
        if let Some(overlay) = state.nodes.get_mut(&overlay_node) {
            overlay.parent = Some(self.id);
        }
        state.deliver(&self.page, &[(self.id, vec![overlay_node], displaced)]);
        Ok(())
    }

    /// Click the element.
    ///
    /// If an overlay is installed, the original content is restored and the
    /// hidden marker cleared; otherwise this is a no-op. Delivers one batch
    /// on reveal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DetachedElement`] if this element no longer exists.
    pub fn click(&self) -> Result<()> {
        let inner = self.inner()?;
        let mut state = inner.state.lock().expect("page state poisoned");
        let Some(node) = state.nodes.get_mut(&self.id) else {
            return Err(Error::DetachedElement);
        };
        let Some(overlay) = node.overlay.take() else {
            return Ok(());
        };
        node.children = overlay.displaced.clone();
        node.marked = false;
        for id in &overlay.displaced {
            if let Some(child) = state.nodes.get_mut(id) {
                child.parent = Some(self.id);
            }
        }
        state.nodes.remove(&overlay.overlay_node);
        state.deliver(
            &self.page,
            &[(self.id, overlay.displaced, vec![overlay.overlay_node])],
        );
        Ok(())
    }

    fn mutate(&self, f: impl FnOnce(&mut NodeData)) -> Result<()> {
        let inner = self.inner()?;
        let mut state = inner.state.lock().expect("page state poisoned");
        match state.nodes.get_mut(&self.id) {
            Some(node) => {
                f(node);
                Ok(())
            }
            None => Err(Error::DetachedElement),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}#{}>", self.tag(), self.id.0)
    }
}
