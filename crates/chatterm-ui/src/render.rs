//! Screen drawing. Every screen shares the same chrome: a header row, a
//! separator, the content area, a footer row for the banner or reply input,
//! and the status bar.

use crate::session::{Banner, BannerLevel};
use crate::state_machine::AppState;
use crate::surface::{StyleToken, Surface};
use crate::viewport::{Viewport, compute_viewport, display_width, truncate_to_width, wrap_text};
use chatterm_core::{Conversation, ConversationFilter, Message};
use time::OffsetDateTime;
use time::macros::format_description;
use unicode_width::UnicodeWidthChar;

pub const MIN_WIDTH: u16 = 20;
pub const MIN_HEIGHT: u16 = 6;
pub const SPINNER_FRAMES: [char; 10] = ['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];

const HEADER_ROW: u16 = 0;
const SEPARATOR_ROW: u16 = 1;
const CONTENT_TOP: u16 = 2;
const CHROME_ROWS: u16 = 4;
const REPLY_PROMPT: &str = "reply> ";
const LOADING_LABEL: &str = "Loading...";
const MESSAGE_HEADER_COL: u16 = 4;
const MESSAGE_BODY_COL: u16 = 6;
const MESSAGE_SEPARATOR_COL: u16 = 2;
const MESSAGE_BODY_MARGIN: usize = 8;
const LIST_ROW_COL: u16 = 2;

/// Everything a screen needs, borrowed from the session for one frame.
#[derive(Debug, Clone)]
pub struct ScreenView<'a> {
    pub state: AppState,
    pub filter: ConversationFilter,
    pub conversations: &'a [Conversation],
    pub selected_conversation: usize,
    pub open_conversation: Option<&'a Conversation>,
    pub messages: &'a [Message],
    pub selected_message: usize,
    pub draft: &'a str,
    pub banner: Option<&'a Banner>,
    pub spinner: Option<char>,
    pub error_message: Option<&'a str>,
    pub settings_lines: Vec<String>,
    pub cursor_visible: bool,
}

/// Rows available to list items for a surface of `height` rows.
pub fn content_height(height: u16) -> usize {
    usize::from(height.saturating_sub(CHROME_ROWS))
}

pub fn render_screen(view: &ScreenView<'_>, surface: &mut dyn Surface) {
    surface.clear();
    let (width, height) = surface.size();
    if width < MIN_WIDTH || height < MIN_HEIGHT {
        surface.put(0, 0, "terminal too small", StyleToken::Error);
        surface.set_cursor(None);
        return;
    }

    match view.state {
        AppState::Init => render_init(surface),
        AppState::ConversationList => render_conversation_list(view, surface),
        AppState::ChatView | AppState::ReplyInput => render_chat(view, surface),
        AppState::Settings => render_settings(view, surface),
        AppState::Error => render_error(view, surface),
    }

    surface.put(SEPARATOR_ROW, 0, &"─".repeat(usize::from(width)), StyleToken::Normal);
    if let Some(frame) = view.spinner {
        let label = format!("{frame} {LOADING_LABEL}");
        let col = width.saturating_sub(display_width(&label) as u16 + 1);
        surface.put(HEADER_ROW, col, &label, StyleToken::Accent);
    }
    render_footer(view, surface);
    render_status_bar(view.state, surface);
}

fn put_header(surface: &mut dyn Surface, title: &str) {
    let (width, _) = surface.size();
    let title = truncate_to_width(title, usize::from(width));
    let col = (usize::from(width) - display_width(&title)) / 2;
    surface.put(HEADER_ROW, col as u16, &title, StyleToken::Header);
}

fn render_init(surface: &mut dyn Surface) {
    put_header(surface, "chatterm");
    surface.put(CONTENT_TOP, LIST_ROW_COL, "Connecting...", StyleToken::Normal);
}

fn render_conversation_list(view: &ScreenView<'_>, surface: &mut dyn Surface) {
    let (width, height) = surface.size();
    let title = match view.filter {
        ConversationFilter::UnreadOnly => "Conversations (unread only)",
        ConversationFilter::All => "Conversations (all)",
    };
    put_header(surface, title);

    if view.conversations.is_empty() {
        let notice = if view.spinner.is_some() {
            "Loading conversations..."
        } else if view.filter.unread_only() {
            "No unread conversations (tab shows all)"
        } else {
            "No conversations"
        };
        surface.put(CONTENT_TOP, LIST_ROW_COL, notice, StyleToken::Normal);
        return;
    }

    let heights = vec![1; view.conversations.len()];
    let viewport = compute_viewport(&heights, content_height(height), view.selected_conversation);
    let text_width = usize::from(width).saturating_sub(usize::from(LIST_ROW_COL) + 3);
    for (row, index) in viewport.range().enumerate() {
        let conversation = &view.conversations[index];
        let line = conversation_line(conversation, text_width);
        let style = if index == view.selected_conversation {
            StyleToken::Selected
        } else if conversation.has_unread() {
            StyleToken::Unread
        } else {
            StyleToken::Normal
        };
        surface.put(CONTENT_TOP + row as u16, LIST_ROW_COL, &line, style);
    }
    draw_scroll_indicators(&viewport, surface);
}

fn conversation_line(conversation: &Conversation, max_width: usize) -> String {
    let line = if conversation.has_unread() {
        format!("{} [{}]", conversation.name, conversation.unread_count)
    } else {
        conversation.name.clone()
    };
    truncate_to_width(&line, max_width)
}

/// Pre-wrapped lines for one message in the chat view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBlock {
    pub header: String,
    pub attachment: Option<String>,
    pub body: Vec<String>,
    pub separator: String,
}

impl MessageBlock {
    pub fn layout(message: &Message, width: u16) -> Self {
        let body_width = usize::from(width)
            .saturating_sub(MESSAGE_BODY_MARGIN)
            .max(1);
        Self {
            header: format!("{} | {}", message.sender, clock_time(message.sent_at)),
            attachment: message.attachment.as_ref().map(|a| a.preview_text()),
            body: wrap_text(&message.body_text(), body_width),
            separator: "-".repeat(
                usize::from(width)
                    .saturating_sub(usize::from(MESSAGE_SEPARATOR_COL) * 2)
                    .max(1),
            ),
        }
    }

    /// Header, optional attachment line, body, separator.
    pub fn height(&self) -> usize {
        2 + usize::from(self.attachment.is_some()) + self.body.len()
    }

    fn lines(&self) -> Vec<(u16, &str, MessageLine)> {
        let mut lines = Vec::with_capacity(self.height());
        lines.push((MESSAGE_HEADER_COL, self.header.as_str(), MessageLine::Header));
        if let Some(attachment) = &self.attachment {
            lines.push((MESSAGE_BODY_COL, attachment.as_str(), MessageLine::Attachment));
        }
        for line in &self.body {
            lines.push((MESSAGE_BODY_COL, line.as_str(), MessageLine::Body));
        }
        lines.push((MESSAGE_SEPARATOR_COL, self.separator.as_str(), MessageLine::Separator));
        lines
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageLine {
    Header,
    Attachment,
    Body,
    Separator,
}

fn clock_time(at: OffsetDateTime) -> String {
    at.format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "--:--:--".to_owned())
}

fn render_chat(view: &ScreenView<'_>, surface: &mut dyn Surface) {
    let (width, height) = surface.size();
    let title = match view.open_conversation {
        Some(conversation) if conversation.has_unread() => {
            format!("{} [{} unread]", conversation.name, conversation.unread_count)
        }
        Some(conversation) => conversation.name.clone(),
        None => "chat".to_owned(),
    };
    let title = truncate_to_width(&title, usize::from(width).saturating_sub(2));
    put_header(surface, &title);

    if view.messages.is_empty() {
        let notice = if view.spinner.is_some() {
            "Loading messages..."
        } else {
            "No messages"
        };
        surface.put(CONTENT_TOP, LIST_ROW_COL, notice, StyleToken::Normal);
        return;
    }

    let blocks: Vec<MessageBlock> = view
        .messages
        .iter()
        .map(|message| MessageBlock::layout(message, width))
        .collect();
    let heights: Vec<usize> = blocks.iter().map(MessageBlock::height).collect();
    let visible = content_height(height);
    let viewport = compute_viewport(&heights, visible, view.selected_message);
    let bottom = CONTENT_TOP + visible as u16;

    let mut row = CONTENT_TOP;
    'blocks: for index in viewport.range() {
        let selected = index == view.selected_message;
        for (col, text, kind) in blocks[index].lines() {
            if row >= bottom {
                break 'blocks;
            }
            let style = match kind {
                MessageLine::Attachment => StyleToken::Accent,
                MessageLine::Header | MessageLine::Body if selected => StyleToken::Selected,
                MessageLine::Header => StyleToken::Header,
                MessageLine::Body | MessageLine::Separator => StyleToken::Normal,
            };
            surface.put(row, col, text, style);
            row += 1;
        }
    }
    draw_scroll_indicators(&viewport, surface);
}

fn render_settings(view: &ScreenView<'_>, surface: &mut dyn Surface) {
    let (_, height) = surface.size();
    put_header(surface, "Settings");
    let visible = content_height(height);
    for (row, line) in view.settings_lines.iter().take(visible).enumerate() {
        surface.put(CONTENT_TOP + row as u16, LIST_ROW_COL, line, StyleToken::Normal);
    }
}

fn render_error(view: &ScreenView<'_>, surface: &mut dyn Surface) {
    let (width, height) = surface.size();
    put_header(surface, "chatterm");
    surface.put(CONTENT_TOP, LIST_ROW_COL, "Something went wrong", StyleToken::Error);

    let detail = view.error_message.unwrap_or("unknown error");
    let wrap_width = usize::from(width).saturating_sub(usize::from(LIST_ROW_COL) * 2).max(1);
    let visible = content_height(height);
    let mut row = CONTENT_TOP + 2;
    for line in wrap_text(detail, wrap_width) {
        if usize::from(row - CONTENT_TOP) >= visible {
            break;
        }
        surface.put(row, LIST_ROW_COL, &line, StyleToken::Normal);
        row += 1;
    }
}

fn render_footer(view: &ScreenView<'_>, surface: &mut dyn Surface) {
    let (width, height) = surface.size();
    let row = height - 2;
    if view.state == AppState::ReplyInput {
        let available = usize::from(width).saturating_sub(REPLY_PROMPT.len() + 1);
        let draft = tail_to_width(view.draft, available);
        surface.put(row, 0, REPLY_PROMPT, StyleToken::Accent);
        surface.put(row, REPLY_PROMPT.len() as u16, &draft, StyleToken::Normal);
        if view.cursor_visible {
            let col = (REPLY_PROMPT.len() + display_width(&draft)).min(usize::from(width) - 1);
            surface.set_cursor(Some((row, col as u16)));
        } else {
            surface.set_cursor(None);
        }
        return;
    }

    surface.set_cursor(None);
    if let Some(banner) = view.banner {
        let (text, style) = match banner.level {
            BannerLevel::Info => (banner.text.clone(), StyleToken::Unread),
            BannerLevel::Error => (format!("ERROR: {}", banner.text), StyleToken::Error),
        };
        let text = truncate_to_width(&text, usize::from(width));
        surface.put(row, 0, &text, style);
    }
}

/// Keeps the end of `text` so the insertion point stays visible.
fn tail_to_width(text: &str, max_width: usize) -> String {
    if display_width(text) <= max_width {
        return text.to_owned();
    }
    let mut kept: Vec<char> = Vec::new();
    let mut used = 0;
    for ch in text.chars().rev() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + ch_width > max_width {
            break;
        }
        used += ch_width;
        kept.push(ch);
    }
    kept.into_iter().rev().collect()
}

fn render_status_bar(state: AppState, surface: &mut dyn Surface) {
    let (width, height) = surface.size();
    let hint = match state {
        AppState::Init => "ctrl+c: quit",
        AppState::ConversationList => {
            "↑↓: navigate | →: open | tab: all/unread | o: settings | q: quit"
        }
        AppState::ChatView => {
            "↑↓: navigate | ←: back | r: reply | s: save attachment | m: mark read"
        }
        AppState::ReplyInput => "enter: send | esc: cancel",
        AppState::Settings => "esc: back",
        AppState::Error => "r: retry | q: quit",
    };
    let text = truncate_to_width(&format!(" {hint}"), usize::from(width));
    let padding = usize::from(width).saturating_sub(display_width(&text));
    let line = format!("{text}{}", " ".repeat(padding));
    surface.put(height - 1, 0, &line, StyleToken::Status);
}

fn draw_scroll_indicators(viewport: &Viewport, surface: &mut dyn Surface) {
    let (width, _) = surface.size();
    if let Some(bar) = viewport.scrollbar {
        let col = width - 2;
        for offset in 0..bar.track_height {
            let glyph = if bar.is_thumb(offset) { "█" } else { "░" };
            surface.put(CONTENT_TOP + offset as u16, col, glyph, StyleToken::Normal);
        }
    }

    let middle = width / 2;
    if viewport.has_more_above() {
        surface.put(CONTENT_TOP, middle, "▲", StyleToken::Accent);
    }
    if viewport.has_more_below() && viewport.visible_height > 0 {
        let last_row = CONTENT_TOP + viewport.visible_height as u16 - 1;
        surface.put(last_row, middle, "▼", StyleToken::Accent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{BufferSurface, Palette};
    use chatterm_core::{Attachment, ConversationId, MessageId, RemoteEntity};
    use ratatui::buffer::Buffer;
    use ratatui::layout::{Position, Rect};
    use ratatui::style::Modifier;
    use std::time::Instant;
    use time::macros::datetime;

    fn conversation(id: i64, name: &str, unread: u32) -> Conversation {
        Conversation::new(ConversationId::new(id), RemoteEntity::group(name), unread)
    }

    fn message(id: i64, text: &str, attachment: Option<Attachment>) -> Message {
        Message {
            id: MessageId::new(id),
            conversation_id: ConversationId::new(1),
            sender: "Ada".to_owned(),
            text: text.to_owned(),
            attachment,
            sent_at: datetime!(2024-05-02 09:12:04 UTC),
        }
    }

    fn view<'a>(state: AppState) -> ScreenView<'a> {
        ScreenView {
            state,
            filter: ConversationFilter::UnreadOnly,
            conversations: &[],
            selected_conversation: 0,
            open_conversation: None,
            messages: &[],
            selected_message: 0,
            draft: "",
            banner: None,
            spinner: None,
            error_message: None,
            settings_lines: Vec::new(),
            cursor_visible: false,
        }
    }

    fn draw(view: &ScreenView<'_>, width: u16, height: u16) -> (Buffer, Option<(u16, u16)>) {
        let palette = Palette::default();
        let mut buffer = Buffer::empty(Rect::new(0, 0, width, height));
        let cursor = {
            let mut surface = BufferSurface::new(&mut buffer, &palette);
            render_screen(view, &mut surface);
            surface.cursor()
        };
        (buffer, cursor)
    }

    fn row_text(buffer: &Buffer, row: u16) -> String {
        (0..buffer.area.width)
            .map(|col| buffer[Position::new(col, row)].symbol())
            .collect::<String>()
            .trim_end()
            .to_owned()
    }

    #[test]
    fn tiny_terminal_shows_notice_only() {
        let (buffer, cursor) = draw(&view(AppState::ConversationList), 10, 4);
        assert_eq!(row_text(&buffer, 0), "terminal t");
        assert_eq!(cursor, None);
    }

    #[test]
    fn conversation_list_marks_unread_and_selection() {
        let conversations = vec![conversation(1, "Ada", 0), conversation(2, "Rust Meetup", 5)];
        let mut screen = view(AppState::ConversationList);
        screen.conversations = &conversations;
        screen.selected_conversation = 1;

        let (buffer, _) = draw(&screen, 40, 10);
        assert_eq!(row_text(&buffer, 0), format!("{}Conversations (unread only)", " ".repeat(6)));
        assert!(row_text(&buffer, 1).starts_with("────"));
        assert_eq!(row_text(&buffer, 2), "  Ada");
        assert_eq!(row_text(&buffer, 3), "  Rust Meetup [5]");
        assert!(buffer[Position::new(2, 3)].modifier.contains(Modifier::REVERSED));
        assert!(!buffer[Position::new(2, 2)].modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn long_conversation_list_draws_scrollbar_and_arrow() {
        let conversations: Vec<Conversation> = (0..20)
            .map(|index| conversation(index, &format!("chat {index}"), 0))
            .collect();
        let mut screen = view(AppState::ConversationList);
        screen.filter = ConversationFilter::All;
        screen.conversations = &conversations;

        let (buffer, _) = draw(&screen, 30, 10);
        // 6 content rows, 20 items: thumb of one row at the top.
        assert_eq!(buffer[Position::new(28, 2)].symbol(), "█");
        assert_eq!(buffer[Position::new(28, 3)].symbol(), "░");
        assert_eq!(buffer[Position::new(15, 7)].symbol(), "▼");
        assert_ne!(buffer[Position::new(15, 2)].symbol(), "▲");
    }

    #[test]
    fn empty_unread_list_hints_at_filter_toggle() {
        let (buffer, _) = draw(&view(AppState::ConversationList), 50, 8);
        assert_eq!(row_text(&buffer, 2), "  No unread conversations (tab shows all)");
    }

    #[test]
    fn message_block_layout_counts_attachment_and_wrapped_body() {
        let with_photo = message(7, "", Some(Attachment::Photo { width: 800, height: 600 }));
        let block = MessageBlock::layout(&with_photo, 30);
        assert_eq!(block.header, "Ada | 09:12:04");
        assert!(block.attachment.is_some());
        assert_eq!(block.body, vec!["[Photo]".to_owned()]);
        assert_eq!(block.height(), 4);
        assert_eq!(block.separator, "-".repeat(26));

        let long = message(8, "one two three four five six", None);
        let block = MessageBlock::layout(&long, 18);
        assert_eq!(block.body.len(), 3);
        assert_eq!(block.height(), 5);
    }

    #[test]
    fn chat_view_draws_message_blocks_in_order() {
        let conversation = conversation(1, "Ada", 0);
        let messages = vec![message(2, "newest", None), message(1, "older", None)];
        let mut screen = view(AppState::ChatView);
        screen.open_conversation = Some(&conversation);
        screen.messages = &messages;

        let (buffer, _) = draw(&screen, 40, 12);
        assert_eq!(row_text(&buffer, 0), format!("{}Ada", " ".repeat(18)));
        assert_eq!(row_text(&buffer, 2), "    Ada | 09:12:04");
        assert_eq!(row_text(&buffer, 3), "      newest");
        assert_eq!(row_text(&buffer, 4), format!("  {}", "-".repeat(36)));
        assert_eq!(buffer[Position::new(38, 4)].symbol(), " ");
        assert_eq!(row_text(&buffer, 6), "      older");
        assert!(buffer[Position::new(4, 2)].modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn oversized_message_is_clipped_to_content_area() {
        let text = (0..40).map(|n| format!("w{n}")).collect::<Vec<_>>().join(" ");
        let messages = vec![message(1, &text, None)];
        let mut screen = view(AppState::ChatView);
        screen.messages = &messages;

        let (buffer, _) = draw(&screen, 20, 8);
        // Content rows 2..6; the status bar on row 7 is intact.
        assert!(row_text(&buffer, 5).starts_with("      w"));
        assert!(row_text(&buffer, 7).starts_with(" ↑↓"));
    }

    #[test]
    fn reply_input_shows_draft_and_cursor() {
        let mut screen = view(AppState::ReplyInput);
        screen.draft = "hello";
        screen.cursor_visible = true;

        let (buffer, cursor) = draw(&screen, 30, 8);
        assert_eq!(row_text(&buffer, 6), "reply> hello");
        assert_eq!(cursor, Some((6, 12)));
    }

    #[test]
    fn long_draft_keeps_its_tail_visible() {
        assert_eq!(tail_to_width("abcdef", 3), "def");
        assert_eq!(tail_to_width("abc", 3), "abc");
    }

    #[test]
    fn error_banner_and_spinner_render_in_chrome() {
        let banner = Banner {
            text: "send failed".to_owned(),
            level: BannerLevel::Error,
            expires_at: Instant::now(),
        };
        let mut screen = view(AppState::ConversationList);
        screen.banner = Some(&banner);
        screen.spinner = Some(SPINNER_FRAMES[0]);

        let (buffer, _) = draw(&screen, 50, 8);
        assert_eq!(row_text(&buffer, 6), "ERROR: send failed");
        assert!(row_text(&buffer, 0).ends_with("⠋ Loading..."));
        assert_eq!(row_text(&buffer, 2), "  Loading conversations...");
    }

    #[test]
    fn error_screen_shows_message_and_retry_hint() {
        let mut screen = view(AppState::Error);
        screen.error_message = Some("network is unreachable");

        let (buffer, _) = draw(&screen, 40, 10);
        assert_eq!(row_text(&buffer, 2), "  Something went wrong");
        assert_eq!(row_text(&buffer, 4), "  network is unreachable");
        assert_eq!(row_text(&buffer, 9), " r: retry | q: quit");
    }
}
