use std::collections::HashMap;

use super::node::{LoadMore, TreeItem};

/// Default number of children revealed per page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Per-parent "pages revealed" counters.
///
/// Counters start at 1 the first time a parent is paginated and only grow
/// until reset. Independent branches of the tree paginate independently.
#[derive(Debug, Clone)]
pub struct PaginationState {
    enabled: bool,
    page_size: usize,
    pages: HashMap<String, usize>,
}

impl PaginationState {
    pub fn new() -> Self {
        Self {
            enabled: false,
            page_size: DEFAULT_PAGE_SIZE,
            pages: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Turn pagination on. `page_size` must be at least 1; callers validate input.
    pub fn enable(&mut self, page_size: usize) {
        debug_assert!(page_size >= 1, "page size must be at least 1");
        self.enabled = true;
        self.page_size = page_size;
        self.pages.clear();
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.pages.clear();
    }

    pub fn pages_revealed(&self, parent_key: &str) -> usize {
        self.pages.get(parent_key).copied().unwrap_or(1)
    }

    /// Reveal one more page under `parent_key`, returning the new count.
    pub fn advance(&mut self, parent_key: &str) -> usize {
        let pages = self.pages.entry(parent_key.to_string()).or_insert(1);
        *pages = pages.saturating_add(1);
        *pages
    }

    pub fn reset(&mut self, parent_key: &str) {
        self.pages.remove(parent_key);
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn tracked_parents(&self) -> usize {
        self.pages.len()
    }

    /// Cut `items` to the revealed pages and append a sentinel if anything is left.
    ///
    /// The sentinel is not counted against the page size.
    pub fn apply<T>(&self, items: Vec<T>, parent_key: &str) -> Vec<TreeItem<T>> {
        if !self.enabled {
            return items.into_iter().map(TreeItem::Node).collect();
        }

        let total = items.len();
        let end_index = self
            .pages_revealed(parent_key)
            .saturating_mul(self.page_size);

        let mut page: Vec<TreeItem<T>> = Vec::with_capacity(end_index.min(total) + 1);
        page.extend(items.into_iter().take(end_index).map(TreeItem::Node));

        if end_index < total {
            page.push(TreeItem::LoadMore(LoadMore {
                parent_key: parent_key.to_string(),
                remaining: total - end_index,
            }));
        }
        page
    }
}

impl Default for PaginationState {
    fn default() -> Self {
        Self::new()
    }
}
