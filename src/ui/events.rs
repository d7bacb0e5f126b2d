//! Processing of events from background tasks and engine callbacks.

use crate::app::{App, AppEvent};

pub(super) fn handle_app_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::TreeChanged(change) => app.handle_tree_change(change),
        AppEvent::ChildrenLoaded {
            parent_key,
            generation,
            result,
        } => app.apply_loaded(parent_key, generation, result),
        AppEvent::WatchFailed {
            path,
            message,
            terminal,
        } => {
            if terminal {
                tracing::warn!(path = %path, "Watch stopped, live updates disabled");
                app.set_status(format!("{} (live updates stopped for {})", message, path));
            } else {
                app.set_status(message);
            }
        }
    }
}
