use std::collections::HashSet;

use tokio::sync::mpsc;

/// Expand/collapse/visibility notification coming from the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Expanded(String),
    Collapsed(String),
    /// The whole tree view was shown or hidden.
    ViewVisible(bool),
}

/// Receiving end of the host's view notifications.
pub struct HostView {
    events: mpsc::UnboundedReceiver<ViewEvent>,
}

impl HostView {
    /// Create a connected pair: the sender goes to the host UI.
    pub fn channel() -> (mpsc::UnboundedSender<ViewEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { events: rx })
    }

    pub(crate) fn try_next(&mut self) -> Option<ViewEvent> {
        self.events.try_recv().ok()
    }
}

/// Node ids the host currently shows expanded.
///
/// This is an optimization hint. A missing id never means "definitely not
/// visible"; refreshes still recompute everything.
#[derive(Debug, Clone)]
pub struct VisibilitySet {
    expanded: HashSet<String>,
    view_visible: bool,
}

impl VisibilitySet {
    pub fn new() -> Self {
        Self {
            expanded: HashSet::new(),
            view_visible: true,
        }
    }

    pub fn apply(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::Expanded(id) => {
                self.expanded.insert(id);
            }
            ViewEvent::Collapsed(id) => {
                self.expanded.remove(&id);
            }
            ViewEvent::ViewVisible(visible) => self.view_visible = visible,
        }
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    pub fn is_view_visible(&self) -> bool {
        self.view_visible
    }

    pub fn expanded(&self) -> impl Iterator<Item = &str> {
        self.expanded.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.expanded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }

    pub fn clear(&mut self) {
        self.expanded.clear();
    }
}

impl Default for VisibilitySet {
    fn default() -> Self {
        Self::new()
    }
}
