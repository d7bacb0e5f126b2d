//! Keyboard input handling.

use crate::app::App;
use crossterm::event::{KeyCode, KeyModifiers};

use super::Action;

/// Longest filter accepted from the prompt.
const MAX_FILTER_LENGTH: usize = 256;

pub(super) fn handle_input(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> Action {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        return Action::Quit;
    }

    if app.filter_input.is_some() {
        handle_filter_input(app, code);
        return Action::Continue;
    }

    match code {
        KeyCode::Char('q') => return Action::Quit,
        KeyCode::Char('j') | KeyCode::Down => app.select_next(),
        KeyCode::Char('k') | KeyCode::Up => app.select_prev(),
        KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => app.activate(),
        KeyCode::Char('h') | KeyCode::Left => app.collapse_selected(),
        KeyCode::Char('/') => app.open_filter(),
        KeyCode::Esc => app.clear_filter(),
        KeyCode::Char('r') => {
            app.engine.refresh_visible();
            app.set_status("Refreshing...");
        }
        KeyCode::Char('p') => {
            let page_size = app.engine.page_size();
            app.toggle_progressive_loading(page_size);
        }
        _ => {}
    }
    Action::Continue
}

/// Live filter prompt: every edit updates the engine's filter.
fn handle_filter_input(app: &mut App, code: KeyCode) {
    let Some(mut text) = app.filter_input.clone() else {
        return;
    };
    match code {
        KeyCode::Esc => app.clear_filter(),
        KeyCode::Enter => app.close_filter(),
        KeyCode::Backspace => {
            text.pop();
            app.edit_filter(text);
        }
        KeyCode::Char(c) if !c.is_control() => {
            if has_room(&text) {
                text.push(c);
                app.edit_filter(text);
            } else {
                app.set_status(format!("Filter too long (max {} chars)", MAX_FILTER_LENGTH));
            }
        }
        _ => {}
    }
}

/// Whether one more character fits in the filter.
fn has_room(text: &str) -> bool {
    text.chars().count() < MAX_FILTER_LENGTH
}
