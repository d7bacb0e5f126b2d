//! The tree presentation engine.
//!
//! [`TreeEngine`] sits between a host UI and a [`TreeDataSource`]: the host
//! asks for the children of a node, the engine fetches raw candidates, runs
//! them through the active filter and then the parent's pagination, and
//! returns the rows to draw. Changes are announced through a single listener
//! as [`TreeChange`] values. Full refreshes are debounced; `load_more` and
//! single-node refreshes are not.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;

use super::debounce::Debouncer;
use super::filter::FilterState;
use super::node::{TreeItem, TreeNode, ROOT_KEY};
use super::pagination::{PaginationState, DEFAULT_PAGE_SIZE};
use super::visibility::{HostView, VisibilitySet};
use crate::cluster::{Recovery, WatchError, WatchManager, WatchRequest, WatchState};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    pub page_size: usize,
    pub progressive_loading: bool,
    pub debounce: Duration,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            progressive_loading: true,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// What the host should redraw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange {
    /// Everything may have changed.
    All,
    /// Only the subtree under this node id.
    Node(String),
}

/// Where candidate children come from.
pub trait TreeDataSource<T>: Send + Sync {
    type Error: fmt::Display;

    /// Raw, unfiltered children of `parent` (`None` is the top level).
    fn children<'a>(&'a self, parent: Option<&'a T>) -> BoxFuture<'a, Result<Vec<T>, Self::Error>>;

    /// Whether the active filter applies to the children of `parent`.
    fn filterable(&self, _parent: Option<&T>) -> bool {
        true
    }

    /// Text of the error leaf shown in place of children that failed to load.
    fn error_message(&self, error: &Self::Error) -> String {
        error.to_string()
    }
}

type Listener = Box<dyn Fn(TreeChange) + Send + Sync>;

/// Single-listener change notification. Clearing it drops the listener, so
/// timers that fire afterwards notify nobody.
#[derive(Clone)]
struct Notifier {
    listener: Arc<Mutex<Option<Listener>>>,
}

impl Notifier {
    fn new(listener: Listener) -> Self {
        Self {
            listener: Arc::new(Mutex::new(Some(listener))),
        }
    }

    fn notify(&self, change: TreeChange) {
        if let Some(listener) = self.lock().as_ref() {
            listener(change);
        }
    }

    fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> MutexGuard<'_, Option<Listener>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct TreeEngine<T> {
    filter: FilterState<T>,
    pagination: PaginationState,
    visibility: VisibilitySet,
    host_view: Option<HostView>,
    notifier: Notifier,
    debouncer: Debouncer,
    watches: Vec<WatchManager>,
    /// Set by watch events; the next `present` drops cached filter results.
    stale: Arc<AtomicBool>,
    disposed: bool,
}

impl<T: TreeNode + Clone> TreeEngine<T> {
    pub fn new(config: TreeConfig, on_change: impl Fn(TreeChange) + Send + Sync + 'static) -> Self {
        let notifier = Notifier::new(Box::new(on_change));
        let debounced = notifier.clone();
        let debouncer = Debouncer::new(config.debounce, move || debounced.notify(TreeChange::All));

        let mut pagination = PaginationState::new();
        if config.progressive_loading {
            pagination.enable(config.page_size);
        }

        Self {
            filter: FilterState::new(),
            pagination,
            visibility: VisibilitySet::new(),
            host_view: None,
            notifier,
            debouncer,
            watches: Vec::new(),
            stale: Arc::new(AtomicBool::new(false)),
            disposed: false,
        }
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    pub fn filter(&self) -> &str {
        self.filter.filter()
    }

    /// Replace the filter text and schedule a full refresh.
    pub fn set_filter(&mut self, text: &str) {
        self.filter.set(text);
        tracing::debug!(filter = %self.filter.filter(), "Tree filter changed");
        self.refresh(None);
    }

    pub fn clear_filter(&mut self) {
        self.set_filter("");
    }

    pub fn apply_filter(&mut self, items: Vec<T>) -> Vec<T> {
        self.filter.apply(items)
    }

    // ========================================================================
    // Progressive Loading
    // ========================================================================

    pub fn is_progressive_loading(&self) -> bool {
        self.pagination.is_enabled()
    }

    pub fn page_size(&self) -> usize {
        self.pagination.page_size()
    }

    /// Show children `page_size` at a time. Every parent starts again at one page.
    pub fn enable_progressive_loading(&mut self, page_size: usize) {
        self.pagination.enable(page_size);
        tracing::debug!(page_size, "Progressive loading enabled");
        self.refresh(None);
    }

    pub fn disable_progressive_loading(&mut self) {
        self.pagination.disable();
        tracing::debug!("Progressive loading disabled");
        self.refresh(None);
    }

    pub fn apply_progressive_loading(&self, items: Vec<T>, parent_key: &str) -> Vec<TreeItem<T>> {
        self.pagination.apply(items, parent_key)
    }

    /// Reveal one more page under `parent_key` and notify right away.
    pub fn load_more(&mut self, parent_key: &str) {
        if self.disposed {
            return;
        }
        let pages = self.pagination.advance(parent_key);
        tracing::debug!(parent = parent_key, pages, "Revealing another page");
        self.notifier.notify(TreeChange::All);
    }

    pub fn reset_pagination(&mut self, parent_key: &str) {
        self.pagination.reset(parent_key);
        self.refresh(None);
    }

    pub fn pages_revealed(&self, parent_key: &str) -> usize {
        self.pagination.pages_revealed(parent_key)
    }

    // ========================================================================
    // Notification
    // ========================================================================

    /// `Some(id)` redraws that node immediately; `None` schedules a debounced
    /// full refresh.
    pub fn refresh(&self, node: Option<&str>) {
        if self.disposed {
            return;
        }
        match node {
            Some(id) => self.notifier.notify(TreeChange::Node(id.to_string())),
            None => self.debouncer.trigger(),
        }
    }

    /// Refresh whatever the host currently shows.
    ///
    /// The visibility set is only a hint, so this refreshes everything.
    pub fn refresh_visible(&mut self) {
        self.sync_host_view();
        self.refresh(None);
    }

    // ========================================================================
    // Host View
    // ========================================================================

    pub fn set_host_view(&mut self, view: HostView) {
        self.host_view = Some(view);
        self.sync_host_view();
    }

    /// Fold pending expand/collapse/visibility notifications into the visibility set.
    pub fn sync_host_view(&mut self) {
        let Some(view) = self.host_view.as_mut() else {
            return;
        };
        while let Some(event) = view.try_next() {
            self.visibility.apply(event);
        }
    }

    pub fn visibility(&self) -> &VisibilitySet {
        &self.visibility
    }

    // ========================================================================
    // Children
    // ========================================================================

    /// Rows to display under `parent` (`None` is the top level).
    ///
    /// A failed fetch yields a single error leaf instead of an error.
    pub async fn get_children<S>(&mut self, source: &S, parent: Option<&T>) -> Vec<TreeItem<T>>
    where
        S: TreeDataSource<T> + ?Sized,
    {
        self.sync_host_view();
        let parent_key = parent.map_or(ROOT_KEY, |p| p.id()).to_string();

        match source.children(parent).await {
            Ok(candidates) => {
                let filterable = source.filterable(parent);
                self.present(&parent_key, filterable, candidates)
            }
            Err(e) => {
                tracing::warn!(parent = %parent_key, error = %e, "Failed to load children");
                vec![TreeItem::Error(source.error_message(&e))]
            }
        }
    }

    /// Filter (when `filterable`) then paginate already-fetched candidates.
    ///
    /// Hosts that fetch on their own tasks hand the results in here.
    pub fn present(&mut self, parent_key: &str, filterable: bool, candidates: Vec<T>) -> Vec<TreeItem<T>> {
        if self.stale.swap(false, Ordering::AcqRel) {
            self.filter.clear_cache();
        }
        let visible = if filterable {
            self.filter.apply_in(parent_key, candidates)
        } else {
            candidates
        };
        self.pagination.apply(visible, parent_key)
    }

    // ========================================================================
    // Watches
    // ========================================================================

    /// Start `manager` on `request` and refresh the tree on every event.
    ///
    /// Events also mark cached filter results stale, since a changed list can
    /// keep its length. The engine owns the manager from here on and stops it
    /// on dispose.
    pub fn watch<F>(&mut self, mut manager: WatchManager, request: WatchRequest, on_error: F)
    where
        F: FnMut(&WatchError, Recovery) + Send + 'static,
    {
        if self.disposed {
            tracing::debug!(path = %request.path, "Ignoring watch on a disposed tree");
            return;
        }
        let debouncer = self.debouncer.clone();
        let stale = Arc::clone(&self.stale);
        manager.start(
            request,
            move |_event| {
                stale.store(true, Ordering::Release);
                debouncer.trigger();
            },
            on_error,
        );
        self.watches.push(manager);
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// State of every owned subscription, with its path.
    pub fn watch_states(&self) -> Vec<(String, WatchState)> {
        self.watches
            .iter()
            .map(|w| (w.path().unwrap_or_default().to_string(), w.state()))
            .collect()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Stop every subscription and release all state. Safe to call twice.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        for watch in &mut self.watches {
            watch.stop();
        }
        self.watches.clear();
        self.debouncer.cancel();
        self.notifier.clear();
        self.pagination.clear();
        self.filter.clear_cache();
        self.visibility.clear();
        self.host_view = None;
        tracing::debug!("Tree engine disposed");
    }
}

impl<T> Drop for TreeEngine<T> {
    fn drop(&mut self) {
        for watch in &mut self.watches {
            watch.stop();
        }
        self.debouncer.cancel();
    }
}

impl<T> fmt::Debug for TreeEngine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeEngine")
            .field("pagination", &self.pagination)
            .field("visibility", &self.visibility)
            .field("watches", &self.watches.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}
