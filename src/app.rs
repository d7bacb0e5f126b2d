//! Host application state for the terminal cluster browser.
//!
//! The app owns a [`TreeEngine`] and the rows currently on screen. Children
//! are fetched on background tasks and handed back through [`AppEvent`]; the
//! engine's change notifications and watch failures arrive the same way.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::cluster::{ClusterTree, Recovery, ResourceNode, WatchManager, WatchRequest};
use crate::config::Config;
use crate::tree::{
    HostView, TreeChange, TreeDataSource, TreeEngine, TreeItem, TreeNode, ViewEvent, ROOT_KEY,
};

/// How long a status message stays on screen.
const STATUS_TTL: Duration = Duration::from_secs(5);

/// Events delivered to the UI loop from background tasks and callbacks.
#[derive(Debug)]
pub enum AppEvent {
    /// The engine asked for a redraw.
    TreeChanged(TreeChange),
    /// A children fetch finished.
    ///
    /// `generation` identifies the request; results from superseded requests
    /// for the same parent are dropped.
    ChildrenLoaded {
        parent_key: String,
        generation: u64,
        result: Result<Vec<ResourceNode>, String>,
    },
    /// A watch failed. `terminal` is set once the subscription gave up.
    WatchFailed {
        path: String,
        message: String,
        terminal: bool,
    },
}

/// One line of the flattened tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub depth: usize,
    /// Key of the parent this row was listed under.
    pub parent_key: String,
    pub item: TreeItem<ResourceNode>,
}

impl Row {
    pub fn node(&self) -> Option<&ResourceNode> {
        self.item.as_node()
    }
}

pub struct App {
    pub engine: TreeEngine<ResourceNode>,
    source: Arc<ClusterTree>,
    event_tx: mpsc::UnboundedSender<AppEvent>,
    view_tx: mpsc::UnboundedSender<ViewEvent>,

    /// Presented rows per parent key, straight from the engine.
    children: HashMap<String, Vec<TreeItem<ResourceNode>>>,
    /// Parent nodes by id, kept so reloads can refetch them.
    parents: HashMap<String, ResourceNode>,
    expanded: HashSet<String>,
    /// Latest request generation per parent key.
    pending: HashMap<String, u64>,
    generation: u64,

    pub rows: Vec<Row>,
    pub selected: usize,

    /// Filter text being typed, `Some` while the filter prompt is open.
    pub filter_input: Option<String>,
    pub status: Option<(String, Instant)>,
    pub needs_redraw: bool,
    pub server: String,
}

impl App {
    pub fn new(config: &Config, source: ClusterTree, event_tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        let listener_tx = event_tx.clone();
        let mut engine = TreeEngine::new(config.tree_config(), move |change| {
            // The receiver only goes away on shutdown
            let _ = listener_tx.send(AppEvent::TreeChanged(change));
        });

        let (view_tx, view) = HostView::channel();
        engine.set_host_view(view);

        Self {
            engine,
            server: source.client().server().to_string(),
            source: Arc::new(source),
            event_tx,
            view_tx,
            children: HashMap::new(),
            parents: HashMap::new(),
            expanded: HashSet::new(),
            pending: HashMap::new(),
            generation: 0,
            rows: Vec::new(),
            selected: 0,
            filter_input: None,
            status: None,
            needs_redraw: true,
        }
    }

    /// Start one watch per configured kind. Every change event refreshes the tree.
    pub fn start_watches(&mut self, config: &Config) {
        let transport = Arc::new(self.source.client().watch_transport());
        for kind in self.source.kinds().to_vec() {
            let manager = WatchManager::new(transport.clone(), config.watch_config());
            let tx = self.event_tx.clone();
            let path = kind.path.to_string();
            self.engine
                .watch(manager, WatchRequest::new(kind.path), move |error, recovery| {
                    let _ = tx.send(AppEvent::WatchFailed {
                        path: path.clone(),
                        message: error.user_message(),
                        terminal: recovery == Recovery::Terminal,
                    });
                });
        }
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Fetch the children of `parent` (`None` for the top level) in the background.
    pub fn spawn_load(&mut self, parent: Option<ResourceNode>) {
        let parent_key = parent.as_ref().map_or(ROOT_KEY, |p| p.id()).to_string();
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        self.pending.insert(parent_key.clone(), generation);
        if let Some(node) = &parent {
            self.parents.insert(parent_key.clone(), node.clone());
        }

        let source = Arc::clone(&self.source);
        let tx = self.event_tx.clone();
        tracing::debug!(parent = %parent_key, generation, "Loading children");

        tokio::spawn(async move {
            let result = source
                .children(parent.as_ref())
                .await
                .map_err(|e| source.error_message(&e));
            let _ = tx.send(AppEvent::ChildrenLoaded {
                parent_key,
                generation,
                result,
            });
        });
    }

    /// Refetch the top level and every expanded parent.
    pub fn reload_all(&mut self) {
        self.spawn_load(None);
        let expanded: Vec<ResourceNode> = self
            .expanded
            .iter()
            .filter_map(|id| self.parents.get(id).cloned())
            .collect();
        for parent in expanded {
            self.spawn_load(Some(parent));
        }
    }

    pub fn handle_tree_change(&mut self, change: TreeChange) {
        match change {
            TreeChange::All => self.reload_all(),
            TreeChange::Node(id) if id == ROOT_KEY => self.spawn_load(None),
            TreeChange::Node(id) => {
                if self.expanded.contains(&id) {
                    if let Some(parent) = self.parents.get(&id).cloned() {
                        self.spawn_load(Some(parent));
                    }
                }
            }
        }
    }

    /// Accept a finished fetch unless a newer one for the same parent is in flight.
    pub fn apply_loaded(
        &mut self,
        parent_key: String,
        generation: u64,
        result: Result<Vec<ResourceNode>, String>,
    ) {
        if self.pending.get(&parent_key) != Some(&generation) {
            tracing::debug!(parent = %parent_key, generation, "Dropping stale children");
            return;
        }
        self.pending.remove(&parent_key);

        let rows = match result {
            Ok(candidates) => {
                let parent = self.parents.get(&parent_key);
                let filterable = self.source.filterable(parent);
                self.engine.present(&parent_key, filterable, candidates)
            }
            Err(message) => vec![TreeItem::Error(message)],
        };
        self.children.insert(parent_key, rows);
        self.rebuild_rows();
    }

    pub fn is_loading(&self) -> bool {
        !self.pending.is_empty()
    }

    // ========================================================================
    // Rows & Selection
    // ========================================================================

    /// Flatten the presented children into the visible row list.
    pub fn rebuild_rows(&mut self) {
        let selected_id = self.selected_row().map(row_id);

        let mut rows = Vec::new();
        if let Some(top) = self.children.get(ROOT_KEY) {
            for item in top {
                let expanded_id = item
                    .as_node()
                    .map(|n| n.id().to_string())
                    .filter(|id| self.expanded.contains(id));
                rows.push(Row {
                    depth: 0,
                    parent_key: ROOT_KEY.to_string(),
                    item: item.clone(),
                });
                if let Some(id) = expanded_id {
                    for child in self.children.get(&id).into_iter().flatten() {
                        rows.push(Row {
                            depth: 1,
                            parent_key: id.clone(),
                            item: child.clone(),
                        });
                    }
                }
            }
        }
        self.rows = rows;

        // Keep the cursor on the same row when it still exists
        self.selected = selected_id
            .and_then(|id| self.rows.iter().position(|r| row_id(r) == id))
            .unwrap_or(self.selected)
            .min(self.rows.len().saturating_sub(1));
        self.needs_redraw = true;
    }

    pub fn selected_row(&self) -> Option<&Row> {
        self.rows.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.rows.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    /// Expand the node under the cursor, or reveal more on a sentinel.
    pub fn activate(&mut self) {
        let Some(row) = self.selected_row().cloned() else {
            return;
        };
        match row.item {
            TreeItem::LoadMore(more) => self.engine.load_more(&more.parent_key),
            TreeItem::Node(node) if node.is_category() => {
                if self.expanded.contains(node.id()) {
                    self.collapse(node.id());
                } else {
                    self.expand(node);
                }
            }
            TreeItem::Node(node) => {
                self.set_status(node.tooltip().unwrap_or(node.id()).to_string());
            }
            TreeItem::Error(message) => self.set_status(message),
        }
    }

    pub fn expand(&mut self, node: ResourceNode) {
        let id = node.id().to_string();
        if !self.expanded.insert(id.clone()) {
            return;
        }
        let _ = self.view_tx.send(ViewEvent::Expanded(id));
        self.spawn_load(Some(node));
        self.rebuild_rows();
    }

    pub fn collapse(&mut self, id: &str) {
        if !self.expanded.remove(id) {
            return;
        }
        let _ = self.view_tx.send(ViewEvent::Collapsed(id.to_string()));
        self.children.remove(id);
        self.pending.remove(id);
        self.engine.reset_pagination(id);
        self.rebuild_rows();
    }

    /// Collapse the selected category, or the category the selected row sits under.
    pub fn collapse_selected(&mut self) {
        let Some(row) = self.selected_row().cloned() else {
            return;
        };
        let target = match (&row.item, row.depth) {
            (TreeItem::Node(node), 0) => node.id().to_string(),
            _ if row.parent_key != ROOT_KEY => row.parent_key.clone(),
            _ => return,
        };
        self.collapse(&target);
        if let Some(pos) = self.rows.iter().position(|r| row_id(r) == target) {
            self.selected = pos;
        }
    }

    // ========================================================================
    // Filter & Paging
    // ========================================================================

    pub fn open_filter(&mut self) {
        self.filter_input = Some(self.engine.filter().to_string());
    }

    /// Update the live filter as the user types. Refreshes are debounced by the engine.
    pub fn edit_filter(&mut self, text: String) {
        self.engine.set_filter(&text);
        self.filter_input = Some(text);
    }

    pub fn close_filter(&mut self) {
        self.filter_input = None;
    }

    pub fn clear_filter(&mut self) {
        self.filter_input = None;
        if !self.engine.filter().is_empty() {
            self.engine.clear_filter();
        }
    }

    pub fn toggle_progressive_loading(&mut self, page_size: usize) {
        if self.engine.is_progressive_loading() {
            self.engine.disable_progressive_loading();
            self.set_status("Progressive loading off");
        } else {
            self.engine.enable_progressive_loading(page_size);
            self.set_status(format!("Progressive loading on ({} per page)", page_size));
        }
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), Instant::now()));
        self.needs_redraw = true;
    }

    /// Drop an expired status message. Returns true if one was cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        match &self.status {
            Some((_, at)) if at.elapsed() >= STATUS_TTL => {
                self.status = None;
                true
            }
            _ => false,
        }
    }

    pub fn shutdown(&mut self) {
        self.engine.dispose();
    }
}

fn row_id(row: &Row) -> String {
    match &row.item {
        TreeItem::Node(node) => node.id().to_string(),
        TreeItem::LoadMore(more) => more.id(),
        TreeItem::Error(_) => format!("{}::error", row.parent_key),
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.engine.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterClient, ResourceKind};
    use pretty_assertions::assert_eq;
    use url::Url;

    fn test_app() -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let client = ClusterClient::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        let kinds = vec![
            ResourceKind::lookup("pods").unwrap(),
            ResourceKind::lookup("services").unwrap(),
        ];
        let (tx, rx) = mpsc::unbounded_channel();
        let config = Config {
            page_size: 2,
            ..Config::default()
        };
        (App::new(&config, ClusterTree::new(client, kinds), tx), rx)
    }

    fn categories(app: &App) -> Vec<ResourceNode> {
        app.source.kinds().iter().map(|&k| ResourceNode::category(k)).collect()
    }

    fn pods(names: &[&str]) -> Vec<ResourceNode> {
        let kind = ResourceKind::lookup("pods").unwrap();
        names
            .iter()
            .map(|name| {
                let resource = serde_json::from_value(serde_json::json!({
                    "metadata": {"name": name, "namespace": "default"}
                }))
                .unwrap();
                ResourceNode::object(kind, resource, chrono::Utc::now())
            })
            .collect()
    }

    fn load_roots(app: &mut App) {
        app.spawn_load(None);
        let generation = app.generation;
        let roots = categories(app);
        app.apply_loaded(ROOT_KEY.to_string(), generation, Ok(roots));
    }

    #[tokio::test]
    async fn test_top_level_rows() {
        let (mut app, _rx) = test_app();
        load_roots(&mut app);
        let labels: Vec<_> = app.rows.iter().map(|r| r.item.to_string()).collect();
        assert_eq!(labels, vec!["Pods", "Services"]);
        assert!(!app.is_loading());
    }

    #[tokio::test]
    async fn test_expand_shows_paginated_children() {
        let (mut app, _rx) = test_app();
        load_roots(&mut app);

        app.activate();
        assert!(app.is_expanded("category/pods"));
        let generation = app.generation;
        app.apply_loaded("category/pods".into(), generation, Ok(pods(&["a", "b", "c"])));

        let labels: Vec<_> = app.rows.iter().map(|r| r.item.to_string()).collect();
        assert_eq!(
            labels,
            vec!["Pods", "a", "b", "Load more... (1 remaining)", "Services"]
        );
        assert_eq!(app.rows[3].depth, 1);
    }

    #[tokio::test]
    async fn test_stale_results_dropped() {
        let (mut app, _rx) = test_app();
        load_roots(&mut app);
        app.spawn_load(None);
        let first = app.generation;
        app.spawn_load(None);

        app.apply_loaded(ROOT_KEY.into(), first, Ok(Vec::new()));
        assert_eq!(app.rows.len(), 2);
        assert!(app.is_loading());
    }

    #[tokio::test]
    async fn test_load_more_sentinel_notifies_immediately() {
        let (mut app, mut rx) = test_app();
        load_roots(&mut app);
        app.activate();
        let generation = app.generation;
        app.apply_loaded("category/pods".into(), generation, Ok(pods(&["a", "b", "c"])));

        app.selected = 3;
        app.activate();
        assert_eq!(app.engine.pages_revealed("category/pods"), 2);

        let mut saw_change = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, AppEvent::TreeChanged(TreeChange::All)) {
                saw_change = true;
            }
        }
        assert!(saw_change);
    }

    #[tokio::test]
    async fn test_collapse_from_child_row() {
        let (mut app, _rx) = test_app();
        load_roots(&mut app);
        app.activate();
        let generation = app.generation;
        app.apply_loaded("category/pods".into(), generation, Ok(pods(&["a"])));

        app.select_next();
        app.collapse_selected();
        assert!(!app.is_expanded("category/pods"));
        assert_eq!(app.rows.len(), 2);
        assert_eq!(app.selected, 0);
    }

    #[tokio::test]
    async fn test_error_result_becomes_error_row() {
        let (mut app, _rx) = test_app();
        load_roots(&mut app);
        app.activate();
        let generation = app.generation;
        app.apply_loaded("category/pods".into(), generation, Err("Permission denied".into()));
        assert_eq!(app.rows[1].item, TreeItem::Error("Permission denied".into()));
    }

    #[test]
    fn test_status_expiry() {
        let (mut app, _rx) = test_app();
        app.set_status("hello");
        assert!(!app.clear_expired_status());
        app.status = Some(("old".into(), Instant::now() - STATUS_TTL));
        assert!(app.clear_expired_status());
        assert!(app.status.is_none());
    }
}
