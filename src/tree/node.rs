use std::fmt;

/// Parent key used for the top level of a tree.
pub const ROOT_KEY: &str = "root";

/// A displayable unit in a paginated, filterable tree.
///
/// `id` is the sole identity key. Two values describing the same underlying
/// resource must return the same `id` even when they come from independent
/// fetches, otherwise the host's diffing and the visibility set drift apart.
pub trait TreeNode {
    fn id(&self) -> &str;

    fn label(&self) -> Option<&str>;

    fn description(&self) -> Option<&str> {
        None
    }

    fn tooltip(&self) -> Option<&str> {
        None
    }

    /// Discriminator for polymorphic behavior (e.g. "category", "pod").
    fn tag(&self) -> &str;
}

/// The "reveal more" sentinel appended after a truncated page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMore {
    /// Parent whose page counter advances when this sentinel is activated.
    pub parent_key: String,
    /// Items still hidden below the current page.
    pub remaining: usize,
}

impl LoadMore {
    pub const TAG: &'static str = "loadMore";

    /// Stable id derived from the parent so the host can diff it like any node.
    pub fn id(&self) -> String {
        format!("{}::{}", self.parent_key, Self::TAG)
    }

    pub fn label(&self) -> String {
        format!("Load more... ({} remaining)", self.remaining)
    }
}

/// One row returned to the host for a parent's children.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeItem<T> {
    Node(T),
    LoadMore(LoadMore),
    /// Synthetic leaf standing in for a failed fetch.
    Error(String),
}

impl<T> TreeItem<T> {
    pub fn as_node(&self) -> Option<&T> {
        match self {
            TreeItem::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn is_load_more(&self) -> bool {
        matches!(self, TreeItem::LoadMore(_))
    }
}

impl<T: TreeNode> TreeItem<T> {
    pub fn tag(&self) -> &str {
        match self {
            TreeItem::Node(node) => node.tag(),
            TreeItem::LoadMore(_) => LoadMore::TAG,
            TreeItem::Error(_) => "error",
        }
    }
}

impl<T: TreeNode> fmt::Display for TreeItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeItem::Node(node) => f.write_str(node.label().unwrap_or_else(|| node.id())),
            TreeItem::LoadMore(more) => f.write_str(&more.label()),
            TreeItem::Error(msg) => write!(f, "Error: {}", msg),
        }
    }
}

/// Minimal node used by tests and examples across the crate.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestNode {
    pub id: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub tooltip: Option<String>,
}

#[cfg(test)]
impl TestNode {
    pub fn named(label: &str) -> Self {
        Self {
            id: format!("test/{}", label),
            label: Some(label.to_string()),
            description: None,
            tooltip: None,
        }
    }
}

#[cfg(test)]
impl TreeNode for TestNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref()
    }

    fn tag(&self) -> &str {
        "test"
    }
}
