//! Paginated, filtered tree presentation.

mod debounce;
mod engine;
mod filter;
mod node;
mod pagination;
mod visibility;

pub use debounce::Debouncer;
pub use engine::{TreeChange, TreeConfig, TreeDataSource, TreeEngine, DEFAULT_DEBOUNCE};
pub use filter::FilterState;
pub use node::{LoadMore, TreeItem, TreeNode, ROOT_KEY};
pub use pagination::{PaginationState, DEFAULT_PAGE_SIZE};
pub use visibility::{HostView, ViewEvent, VisibilitySet};
