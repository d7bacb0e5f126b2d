use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Terminal columns occupied by `s` (CJK and emoji count as 2).
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Cut `s` to at most `max_width` columns, ending in "..." when cut.
///
/// Widths too narrow for a character plus the ellipsis keep as many
/// characters as fit and drop the ellipsis.
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width > ELLIPSIS_WIDTH {
        max_width - ELLIPSIS_WIDTH
    } else {
        max_width
    };

    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    if max_width > ELLIPSIS_WIDTH {
        Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
    } else {
        Cow::Owned(s[..end].to_string())
    }
}

/// Drop control characters from server-supplied text before it reaches the
/// terminal. An escape sequence loses its ESC byte and becomes inert.
pub fn sanitize(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !c.is_control()).collect())
}

/// Lay out one tree row: `prefix` and `label` always, `description` dimmed
/// to the right when there is room, all within `width` columns.
///
/// Returns the label part and the (possibly empty) description part.
pub fn fit_row(prefix: &str, label: &str, description: Option<&str>, width: usize) -> (String, String) {
    let label = sanitize(label);
    let head_width = width.saturating_sub(display_width(prefix));
    let head = format!("{}{}", prefix, truncate_to_width(&label, head_width));

    let spare = width.saturating_sub(display_width(&head));
    let tail = match description {
        // Two columns of gap, and never squeeze a description below 4 columns
        Some(desc) if spare >= 6 => {
            let desc = sanitize(desc);
            format!("  {}", truncate_to_width(&desc, spare - 2))
        }
        _ => String::new(),
    };
    (head, tail)
}
