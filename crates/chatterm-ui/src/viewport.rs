//! Scroll window selection shared by the conversation list and the message
//! list, plus the word wrapping that feeds message heights.

use std::ops::Range;
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub start: usize,
    pub rendered_count: usize,
    pub visible_height: usize,
    pub total: usize,
    /// Present only when some items are not drawn.
    pub scrollbar: Option<ScrollbarGeometry>,
}

impl Viewport {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.rendered_count
    }

    pub fn has_more_above(&self) -> bool {
        self.start > 0
    }

    pub fn has_more_below(&self) -> bool {
        self.start + self.rendered_count < self.total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollbarGeometry {
    pub thumb_pos: usize,
    pub thumb_height: usize,
    pub track_height: usize,
}

impl ScrollbarGeometry {
    pub fn is_thumb(&self, row: usize) -> bool {
        row >= self.thumb_pos && row < self.thumb_pos + self.thumb_height
    }
}

/// Lays out `heights` in `visible_height` rows so that `selected` is on screen.
pub fn compute_viewport(heights: &[usize], visible_height: usize, selected: usize) -> Viewport {
    let total = heights.len();
    if total == 0 {
        return Viewport {
            start: 0,
            rendered_count: 0,
            visible_height,
            total,
            scrollbar: None,
        };
    }

    let selected = selected.min(total - 1);
    let start = first_visible_index(heights, visible_height, selected);
    let rendered_count = rendered_count(heights, visible_height, start);
    let scrollbar = (rendered_count < total && visible_height > 0)
        .then(|| scrollbar_geometry(visible_height, rendered_count, start, total));

    Viewport {
        start,
        rendered_count,
        visible_height,
        total,
        scrollbar,
    }
}

/// When everything fits the window starts at the top. Otherwise, if the
/// selected item plus everything above it overflows, the selected item becomes
/// the first row; if not, items above it are absorbed while they still fit.
pub fn first_visible_index(heights: &[usize], visible_height: usize, selected: usize) -> usize {
    if heights.iter().sum::<usize>() <= visible_height {
        return 0;
    }

    let height_before: usize = heights[..selected].iter().sum();
    let selected_height = heights[selected];
    if height_before + selected_height > visible_height {
        return selected;
    }

    let mut used = selected_height;
    let mut start = selected;
    for index in (0..selected).rev() {
        if used + heights[index] > visible_height {
            break;
        }
        used += heights[index];
        start = index;
    }
    start
}

/// Counts the items drawn from `start` until the next one would not fit.
/// An item taller than the whole window still counts once, clipped.
pub fn rendered_count(heights: &[usize], visible_height: usize, start: usize) -> usize {
    let mut remaining = visible_height;
    let mut count = 0;
    for &height in heights.iter().skip(start) {
        if height > remaining {
            break;
        }
        remaining -= height;
        count += 1;
    }
    if count == 0 && start < heights.len() {
        count = 1;
    }
    count
}

pub fn scrollbar_geometry(
    visible_height: usize,
    rendered_count: usize,
    start: usize,
    total: usize,
) -> ScrollbarGeometry {
    let total = total.max(1);
    let thumb_height = (visible_height * rendered_count / total).max(1);
    let thumb_pos = (start * visible_height / total).min(visible_height.saturating_sub(thumb_height));
    ScrollbarGeometry {
        thumb_pos,
        thumb_height,
        track_height: visible_height,
    }
}

pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Splits on newlines, then greedily packs space-separated words into lines
/// of at most `width` columns. A word wider than `width` gets a line of its own.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for raw_line in text.split('\n') {
        if display_width(raw_line) <= width {
            lines.push(raw_line.to_owned());
            continue;
        }

        let mut current = String::new();
        for word in raw_line.split(' ').filter(|word| !word.is_empty()) {
            if current.is_empty() {
                current.push_str(word);
            } else if display_width(&current) + 1 + display_width(word) <= width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

/// Cuts `text` to `max_width` columns, marking the cut with `...` when there is room.
pub fn truncate_to_width(text: &str, max_width: usize) -> String {
    if display_width(text) <= max_width {
        return text.to_owned();
    }
    let (budget, suffix) = if max_width > 3 {
        (max_width - 3, "...")
    } else {
        (max_width, "")
    };
    let mut truncated = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_width = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + ch_width > budget {
            break;
        }
        truncated.push(ch);
        used += ch_width;
    }
    truncated.push_str(suffix);
    truncated
}
