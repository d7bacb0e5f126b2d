//! Paginated, filtered tree presentation over a live cluster change feed.
//!
//! - [`tree`] is the presentation engine: per-parent pagination, a cached
//!   filter, debounced change notification and host visibility tracking.
//! - [`cluster`] lists cluster resources and follows their change feeds with
//!   bounded reconnect.

pub mod app;
pub mod cluster;
pub mod config;
pub mod tree;
pub mod ui;
pub mod util;
