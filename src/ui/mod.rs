//! Terminal host for the tree engine.
//!
//! - `loop_runner` - main event loop and terminal management
//! - `input` - keyboard input handling
//! - `events` - background event processing
//! - `render` - layout and frame drawing
//! - `tree` - the tree list widget
//! - `status` - status bar widget

mod events;
mod input;
mod loop_runner;
mod render;
mod status;
mod tree;

pub use loop_runner::{run, Action};
