use std::num::NonZeroUsize;

use lru::LruCache;

use super::node::TreeNode;

/// Upper bound on cached filter results.
const FILTER_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => unreachable!(),
};

/// Active filter text plus a cache of filtered results.
///
/// The cache is keyed on `(filter, scope, input length)` rather than item
/// identity, where the scope is the parent the items were listed under.
/// Candidate lists are refetched on every expansion, so there is nothing
/// cheaper than hashing every item to tell two lists apart. A list whose
/// content changes at the same length is served stale until the filter
/// changes, the length moves, or the cache is cleared.
///
/// [`TreeEngine`](super::TreeEngine) clears the cache on the first
/// presentation after any watch event, so only refreshes without a change
/// feed behind them are exposed to the equal-length case.
pub struct FilterState<T> {
    filter: String,
    cache: LruCache<(String, String, usize), Vec<T>>,
}

impl<T: TreeNode + Clone> FilterState<T> {
    pub fn new() -> Self {
        Self {
            filter: String::new(),
            cache: LruCache::new(FILTER_CACHE_CAPACITY),
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn is_active(&self) -> bool {
        !self.filter.is_empty()
    }

    /// Replace the filter (case-folded) and drop every cached result.
    pub fn set(&mut self, text: &str) {
        self.filter = text.to_lowercase();
        self.cache.clear();
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Keep the items whose label, description or tooltip contains the filter.
    ///
    /// An empty filter hands the input back untouched.
    pub fn apply(&mut self, items: Vec<T>) -> Vec<T> {
        self.apply_in("", items)
    }

    /// [`apply`](Self::apply) with results cached separately per `scope`.
    pub fn apply_in(&mut self, scope: &str, items: Vec<T>) -> Vec<T> {
        if self.filter.is_empty() {
            return items;
        }

        let key = (self.filter.clone(), scope.to_string(), items.len());
        if let Some(hit) = self.cache.get(&key) {
            tracing::trace!(filter = %self.filter, scope, len = items.len(), "Filter cache hit");
            return hit.clone();
        }

        let filtered: Vec<T> = items
            .into_iter()
            .filter(|item| matches(item, &self.filter))
            .collect();

        tracing::debug!(
            filter = %self.filter,
            scope,
            candidates = key.2,
            matched = filtered.len(),
            "Applied tree filter"
        );
        self.cache.put(key, filtered.clone());
        filtered
    }
}

impl<T: TreeNode + Clone> Default for FilterState<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Case-insensitive substring match over label, description, tooltip in that order.
fn matches<T: TreeNode>(item: &T, needle: &str) -> bool {
    [item.label(), item.description(), item.tooltip()]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}
