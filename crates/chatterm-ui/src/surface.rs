use ratatui::buffer::Buffer;
use ratatui::style::{Color, Modifier, Style};
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleToken {
    Normal,
    Header,
    Unread,
    Selected,
    Accent,
    Error,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    header: Color,
    unread: Color,
    selected: Color,
    error: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            header: Color::Cyan,
            unread: Color::Green,
            selected: Color::Yellow,
            error: Color::Red,
        }
    }
}

impl Palette {
    /// Unknown color names keep the default for that slot.
    pub fn from_names(header: &str, unread: &str, selected: &str, error: &str) -> Self {
        let defaults = Self::default();
        Self {
            header: parse_color("header", header, defaults.header),
            unread: parse_color("unread", unread, defaults.unread),
            selected: parse_color("selected", selected, defaults.selected),
            error: parse_color("error", error, defaults.error),
        }
    }

    pub fn style(&self, token: StyleToken) -> Style {
        match token {
            StyleToken::Normal => Style::default(),
            StyleToken::Header => Style::default()
                .fg(self.header)
                .add_modifier(Modifier::BOLD),
            StyleToken::Unread => Style::default()
                .fg(self.unread)
                .add_modifier(Modifier::BOLD),
            StyleToken::Selected => Style::default()
                .fg(self.selected)
                .add_modifier(Modifier::REVERSED),
            StyleToken::Accent => Style::default().fg(self.selected),
            StyleToken::Error => Style::default()
                .fg(self.error)
                .add_modifier(Modifier::BOLD),
            StyleToken::Status => Style::default().add_modifier(Modifier::REVERSED),
        }
    }
}

fn parse_color(slot: &str, name: &str, fallback: Color) -> Color {
    match Color::from_str(name.trim()) {
        Ok(color) => color,
        Err(_) => {
            warn!(slot, name, "unknown color name; using default");
            fallback
        }
    }
}

/// Drawing capability the screens render into.
pub trait Surface {
    /// `(width, height)` in cells.
    fn size(&self) -> (u16, u16);

    fn clear(&mut self);

    /// Writes `text` at `(row, col)`, cut off at the right edge.
    fn put(&mut self, row: u16, col: u16, text: &str, style: StyleToken);

    /// `None` hides the cursor.
    fn set_cursor(&mut self, position: Option<(u16, u16)>);
}

/// [`Surface`] over a ratatui buffer, e.g. the one inside a terminal frame.
pub struct BufferSurface<'a> {
    buffer: &'a mut Buffer,
    palette: &'a Palette,
    cursor: Option<(u16, u16)>,
}

impl<'a> BufferSurface<'a> {
    pub fn new(buffer: &'a mut Buffer, palette: &'a Palette) -> Self {
        Self {
            buffer,
            palette,
            cursor: None,
        }
    }

    /// Requested cursor as `(row, col)`.
    pub fn cursor(&self) -> Option<(u16, u16)> {
        self.cursor
    }
}

impl Surface for BufferSurface<'_> {
    fn size(&self) -> (u16, u16) {
        (self.buffer.area.width, self.buffer.area.height)
    }

    fn clear(&mut self) {
        self.buffer.reset();
    }

    fn put(&mut self, row: u16, col: u16, text: &str, style: StyleToken) {
        let area = self.buffer.area;
        if row >= area.height || col >= area.width {
            return;
        }
        let max_width = usize::from(area.width - col);
        self.buffer.set_stringn(
            area.x + col,
            area.y + row,
            text,
            max_width,
            self.palette.style(style),
        );
    }

    fn set_cursor(&mut self, position: Option<(u16, u16)>) {
        self.cursor = position;
    }
}
