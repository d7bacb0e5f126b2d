use crate::app::App;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use std::borrow::Cow;

/// Render the status bar: filter prompt, status message, or key hints.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 1 || area.height < 1 {
        return;
    }

    let text: Cow<'_, str> = if let Some(input) = &app.filter_input {
        Cow::Owned(format!("/{}", input))
    } else if let Some((msg, _)) = &app.status {
        Cow::Borrowed(msg.as_str())
    } else if !app.engine.filter().is_empty() {
        Cow::Owned(format!(
            "filter: {} | ESC clear | [/]edit [r]efresh [p]aging [q]uit",
            app.engine.filter()
        ))
    } else {
        Cow::Borrowed("[j/k]move [enter]open [h]close [/]filter [r]efresh [p]aging [q]uit")
    };

    let style = Style::default().bg(Color::DarkGray).fg(Color::White);
    f.render_widget(Paragraph::new(text).style(style), area);
}
