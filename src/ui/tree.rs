use crate::app::{App, Row};
use crate::tree::{TreeItem, TreeNode};
use crate::util::fit_row;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

const SPINNER: &[&str] = &["|", "/", "-", "\\"];

/// Render the resource tree panel.
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    if area.width < 3 || area.height < 3 {
        return;
    }

    // Borders take two columns
    let inner_width = usize::from(area.width.saturating_sub(2));
    let items: Vec<ListItem> = app
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let line = row_line(app, row, inner_width);
            if i == app.selected {
                ListItem::new(line).style(Style::default().add_modifier(Modifier::REVERSED))
            } else {
                ListItem::new(line)
            }
        })
        .collect();

    let mut title = format!(" {} ", app.server);
    if app.is_loading() {
        let frame = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() / 250)
            .unwrap_or(0) as usize)
            % SPINNER.len();
        title.push_str(SPINNER[frame]);
        title.push(' ');
    }

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    let mut state = ListState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(list, area, &mut state);
}

fn row_line<'a>(app: &App, row: &'a Row, width: usize) -> Line<'a> {
    let indent = "  ".repeat(row.depth);
    match &row.item {
        TreeItem::Node(node) => {
            let icon = if node.is_category() {
                if app.is_expanded(node.id()) {
                    "v "
                } else {
                    "> "
                }
            } else {
                "  "
            };
            let prefix = format!("{}{}", indent, icon);
            let (head, tail) = fit_row(&prefix, &node.label, node.description(), width);
            Line::from(vec![
                Span::raw(head),
                Span::styled(tail, Style::default().fg(Color::DarkGray)),
            ])
        }
        TreeItem::LoadMore(more) => {
            let prefix = format!("{}  ", indent);
            let (head, _) = fit_row(&prefix, &more.label(), None, width);
            Line::from(Span::styled(head, Style::default().fg(Color::Cyan)))
        }
        TreeItem::Error(message) => {
            let prefix = format!("{}! ", indent);
            let (head, _) = fit_row(&prefix, message, None, width);
            Line::from(Span::styled(head, Style::default().fg(Color::Red)))
        }
    }
}
