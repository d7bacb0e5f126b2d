//! Text helpers for drawing tree rows in a terminal.

mod text;

pub use text::{display_width, fit_row, sanitize, truncate_to_width};
