//! The interactive session: screen state, cached data and the handlers that
//! turn key commands into background client calls.

use crate::keymap::{KeyDispatch, KeyStroke, Keymap, UiCommand, default_keymap_config};
use crate::render::{SPINNER_FRAMES, ScreenView, render_screen};
use crate::state_machine::{AppState, StateData, StateMachine};
use crate::surface::Surface;
use chatterm_cache::{CacheError, TtlCache};
use chatterm_core::{
    ChatError, Conversation, ConversationFilter, ConversationId, Message, MessageId,
    MessagingClient,
};
use chatterm_tasks::{BackgroundTask, TaskId, TaskOrchestrator};
use serde_json::Value;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub type SessionCache = TtlCache<Vec<Conversation>, Vec<Message>>;
type Tasks = TaskOrchestrator<SessionState>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerLevel {
    Info,
    Error,
}

/// Transient one-line notice shown above the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub text: String,
    pub level: BannerLevel,
    pub expires_at: Instant,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub conversations_limit: usize,
    pub messages_limit: usize,
    pub initial_filter: ConversationFilter,
    pub banner_ttl: Duration,
    pub download_dir: PathBuf,
    pub open_after_download: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            conversations_limit: 100,
            messages_limit: 30,
            initial_filter: ConversationFilter::UnreadOnly,
            banner_ttl: Duration::from_secs(5),
            download_dir: PathBuf::from("."),
            open_after_download: false,
        }
    }
}

/// Mutable state handed to background task callbacks.
pub struct SessionState {
    client: Arc<dyn MessagingClient>,
    settings: SessionSettings,
    machine: StateMachine,
    cache: SessionCache,
    filter: ConversationFilter,
    conversations: Vec<Conversation>,
    selected_conversation: usize,
    open_conversation: Option<Conversation>,
    messages: Vec<Message>,
    selected_message: usize,
    draft: String,
    banner: Option<Banner>,
    running: bool,
    redraw_requested: bool,
    cursor_visible: Rc<Cell<bool>>,
    list_fetch: Option<TaskId>,
    list_generation: u64,
    message_fetch: Option<TaskId>,
    message_generation: u64,
    started_at: Instant,
}

pub struct Session {
    state: SessionState,
    tasks: Tasks,
    keymap: Keymap,
}

impl Session {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        settings: SessionSettings,
        cache: SessionCache,
        tasks: Tasks,
    ) -> Result<Self, ChatError> {
        let keymap = Keymap::compile(&default_keymap_config())
            .map_err(|err| ChatError::Configuration(err.to_string()))?;

        let mut machine = StateMachine::new(AppState::Init);
        let cursor_visible = Rc::new(Cell::new(false));
        for state in AppState::ALL {
            let cursor = Rc::clone(&cursor_visible);
            let show = state == AppState::ReplyInput;
            machine.register_listener(state, move |_| {
                cursor.set(show);
                Ok(())
            });
        }

        let filter = settings.initial_filter;
        Ok(Self {
            state: SessionState {
                client,
                settings,
                machine,
                cache,
                filter,
                conversations: Vec::new(),
                selected_conversation: 0,
                open_conversation: None,
                messages: Vec::new(),
                selected_message: 0,
                draft: String::new(),
                banner: None,
                running: true,
                redraw_requested: false,
                cursor_visible,
                list_fetch: None,
                list_generation: 0,
                message_fetch: None,
                message_generation: 0,
                started_at: Instant::now(),
            },
            tasks,
            keymap,
        })
    }

    /// Kicks off the first conversation fetch.
    pub fn start(&mut self) {
        self.state.refresh_conversations(&mut self.tasks, false);
    }

    pub fn handle_key(&mut self, stroke: KeyStroke) -> KeyDispatch {
        let dispatch = self.keymap.dispatch(self.state.machine.state(), stroke);
        match dispatch {
            KeyDispatch::Command(command) => self.run_command(command),
            KeyDispatch::Unhandled(stroke) => {
                if self.state.machine.state() == AppState::ReplyInput {
                    if let Some(ch) = stroke.printable_char() {
                        self.state.draft.push(ch);
                    }
                } else {
                    debug!(key = %stroke, state = ?self.state.machine.state(), "unbound key");
                }
            }
        }
        dispatch
    }

    pub fn run_command(&mut self, command: UiCommand) {
        debug!(command = command.id(), "running command");
        let Self { state, tasks, .. } = self;
        match command {
            UiCommand::Quit => state.running = false,
            UiCommand::Reconnect => state.reconnect(tasks),
            UiCommand::Redraw => state.redraw_requested = true,
            UiCommand::SelectPrevious => state.move_selection(false),
            UiCommand::SelectNext => state.move_selection(true),
            UiCommand::OpenConversation => state.open_selected_conversation(tasks),
            UiCommand::ToggleFilter => state.toggle_filter(tasks),
            UiCommand::OpenSettings => {
                state.machine.set_state(AppState::Settings, None);
            }
            UiCommand::CloseSettings => {
                state.machine.return_to_previous();
            }
            UiCommand::BackToList => state.back_to_list(tasks),
            UiCommand::StartReply => state.start_reply(),
            UiCommand::SaveAttachment => state.save_selected_attachment(tasks),
            UiCommand::MarkRead => state.mark_open_conversation_read(tasks),
            UiCommand::SendReply => state.send_reply(tasks),
            UiCommand::CancelReply => state.cancel_reply(),
            UiCommand::DeleteDraftChar => {
                state.draft.pop();
            }
            UiCommand::Retry => state.refresh_conversations(tasks, true),
        }
    }

    /// Runs settled task callbacks and expires the banner.
    /// Returns how many tasks settled.
    pub fn tick(&mut self) -> usize {
        let settled = self.tasks.drain_completed(&mut self.state);
        if self
            .state
            .banner
            .as_ref()
            .is_some_and(|banner| banner.expires_at <= Instant::now())
        {
            self.state.banner = None;
        }
        settled
    }

    pub fn render(&self, surface: &mut dyn Surface) {
        let state = &self.state;
        let spinner = (self.tasks.active_count() > 0).then(|| {
            let frame = (state.started_at.elapsed().as_millis() / 100) as usize % SPINNER_FRAMES.len();
            SPINNER_FRAMES[frame]
        });
        let view = ScreenView {
            state: state.machine.state(),
            filter: state.filter,
            conversations: &state.conversations,
            selected_conversation: state.selected_conversation,
            open_conversation: state.open_conversation.as_ref(),
            messages: &state.messages,
            selected_message: state.selected_message,
            draft: &state.draft,
            banner: state.banner.as_ref(),
            spinner,
            error_message: state.machine.value("message").and_then(Value::as_str),
            settings_lines: if state.machine.state() == AppState::Settings {
                state.settings_lines()
            } else {
                Vec::new()
            },
            cursor_visible: state.cursor_visible.get(),
        };
        render_screen(&view, surface);
    }

    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Returns and clears a pending full-redraw request.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.state.redraw_requested)
    }

    /// Cancels outstanding work, waits for it to stop, then saves cache metadata.
    pub async fn shutdown(&mut self) -> Result<(), CacheError> {
        self.tasks.shutdown().await;
        self.state.cache.persist_metadata()
    }

    pub fn state(&self) -> AppState {
        self.state.machine.state()
    }

    pub fn filter(&self) -> ConversationFilter {
        self.state.filter
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.state.conversations
    }

    pub fn selected_conversation(&self) -> usize {
        self.state.selected_conversation
    }

    pub fn open_conversation(&self) -> Option<&Conversation> {
        self.state.open_conversation.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn selected_message(&self) -> usize {
        self.state.selected_message
    }

    pub fn draft(&self) -> &str {
        &self.state.draft
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.state.banner.as_ref()
    }

    pub fn cursor_visible(&self) -> bool {
        self.state.cursor_visible.get()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.state.machine.value("message").and_then(Value::as_str)
    }

    pub fn active_task_count(&self) -> usize {
        self.tasks.active_count()
    }

    pub fn cache(&self) -> &SessionCache {
        &self.state.cache
    }
}

impl SessionState {
    fn refresh_conversations(&mut self, tasks: &mut Tasks, force: bool) {
        if let Some(previous) = self.list_fetch.take() {
            tasks.cancel(previous);
        }
        self.list_generation += 1;

        if !force {
            if let Some(cached) = self.cache.get_list(self.filter) {
                debug!(filter = self.filter.label(), "conversation list served from cache");
                let conversations = cached.clone();
                self.apply_conversations(conversations);
                return;
            }
        }

        let generation = self.list_generation;
        let filter = self.filter;
        let limit = self.settings.conversations_limit;
        let client = Arc::clone(&self.client);
        let task = BackgroundTask::new("list_conversations", async move {
            client.list_conversations(limit, filter.unread_only()).await
        })
        .on_complete(move |state: &mut SessionState, _: &mut Tasks, conversations: Vec<Conversation>| {
            state.cache.store_list(conversations.clone(), filter);
            if state.list_generation == generation {
                state.list_fetch = None;
                state.apply_conversations(conversations);
            }
            Ok(())
        })
        .on_error(move |state: &mut SessionState, _: &mut Tasks, error| {
            if state.list_generation == generation {
                state.list_fetch = None;
                state.report_list_failure(error);
            }
            Ok(())
        });
        self.list_fetch = Some(tasks.schedule(task));
    }

    fn apply_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        if self.selected_conversation >= self.conversations.len() {
            self.selected_conversation = 0;
        }
        if matches!(self.machine.state(), AppState::Init | AppState::Error) {
            self.machine.remove_value("message");
            self.machine.set_state(AppState::ConversationList, None);
        }
    }

    fn report_list_failure(&mut self, error: ChatError) {
        match self.machine.state() {
            AppState::Init | AppState::Error => {
                self.machine.insert_value("message", error.to_string());
                self.machine.set_state(AppState::Error, None);
            }
            _ => self.show_banner(
                BannerLevel::Error,
                format!("failed to load conversations: {error}"),
            ),
        }
    }

    fn refresh_messages(&mut self, tasks: &mut Tasks, force: bool) {
        let Some(conversation) = self.open_conversation.clone() else {
            return;
        };
        if let Some(previous) = self.message_fetch.take() {
            tasks.cancel(previous);
        }
        self.message_generation += 1;

        if !force {
            if let Some(cached) = self.cache.get_detail(conversation.id) {
                debug!(conversation = %conversation.id, "messages served from cache");
                let messages = cached.clone();
                self.apply_messages(messages);
                return;
            }
        }

        let generation = self.message_generation;
        let conversation_id = conversation.id;
        let limit = self.settings.messages_limit;
        let client = Arc::clone(&self.client);
        let task = BackgroundTask::new("list_messages", async move {
            client.list_messages(&conversation.handle, limit).await
        })
        .on_complete(move |state: &mut SessionState, _: &mut Tasks, messages: Vec<Message>| {
            state.cache.store_detail(conversation_id, messages.clone());
            if state.message_generation == generation && state.is_open(conversation_id) {
                state.message_fetch = None;
                state.apply_messages(messages);
            }
            Ok(())
        })
        .on_error(move |state: &mut SessionState, _: &mut Tasks, error| {
            if state.message_generation == generation {
                state.message_fetch = None;
                state.show_banner(BannerLevel::Error, format!("failed to load messages: {error}"));
            }
            Ok(())
        });
        self.message_fetch = Some(tasks.schedule(task));
    }

    /// Keeps the selection on the same message when a refresh shifts the list.
    fn apply_messages(&mut self, messages: Vec<Message>) {
        let previous = self.selected_message_id();
        self.messages = messages;
        let kept = previous.and_then(|id| self.messages.iter().position(|m| m.id == id));
        self.selected_message = match kept {
            Some(index) => index,
            None if self.selected_message < self.messages.len() => self.selected_message,
            None => 0,
        };
    }

    fn is_open(&self, conversation_id: ConversationId) -> bool {
        self.open_conversation
            .as_ref()
            .is_some_and(|open| open.id == conversation_id)
    }

    fn move_selection(&mut self, forward: bool) {
        let (selected, len) = match self.machine.state() {
            AppState::ConversationList => (&mut self.selected_conversation, self.conversations.len()),
            AppState::ChatView => (&mut self.selected_message, self.messages.len()),
            _ => return,
        };
        if forward {
            if *selected + 1 < len {
                *selected += 1;
            }
        } else {
            *selected = selected.saturating_sub(1);
        }
    }

    fn open_selected_conversation(&mut self, tasks: &mut Tasks) {
        let Some(conversation) = self.conversations.get(self.selected_conversation).cloned() else {
            return;
        };
        info!(conversation = %conversation.id, "opening conversation");
        let mut data = StateData::new();
        data.insert("conversation_id".to_owned(), Value::from(conversation.id.get()));
        data.insert("conversation_name".to_owned(), Value::from(conversation.name.clone()));

        self.open_conversation = Some(conversation);
        self.messages.clear();
        self.selected_message = 0;
        self.machine.set_state(AppState::ChatView, Some(data));
        self.refresh_messages(tasks, false);
    }

    fn back_to_list(&mut self, tasks: &mut Tasks) {
        if let Some(pending) = self.message_fetch.take() {
            tasks.cancel(pending);
        }
        self.open_conversation = None;
        self.messages.clear();
        self.selected_message = 0;
        self.draft.clear();
        self.machine.set_state(AppState::ConversationList, None);
        let evicted = self.cache.evict_expired();
        if evicted > 0 {
            debug!(evicted, "evicted expired cache entries");
        }
        self.refresh_conversations(tasks, false);
    }

    fn toggle_filter(&mut self, tasks: &mut Tasks) {
        self.filter = self.filter.toggled();
        self.selected_conversation = 0;
        info!(filter = self.filter.label(), "conversation filter changed");
        self.refresh_conversations(tasks, false);
    }

    fn start_reply(&mut self) {
        if self.open_conversation.is_none() {
            return;
        }
        let reply_to = self
            .selected_message_id()
            .map(|id| Value::from(id.get()))
            .unwrap_or(Value::Null);
        let mut data = StateData::new();
        data.insert("reply_to".to_owned(), reply_to);
        self.draft.clear();
        self.machine.set_state(AppState::ReplyInput, Some(data));
    }

    fn cancel_reply(&mut self) {
        self.draft.clear();
        self.machine.remove_value("reply_to");
        self.machine.set_state(AppState::ChatView, None);
    }

    fn selected_message_id(&self) -> Option<MessageId> {
        self.messages.get(self.selected_message).map(|message| message.id)
    }

    fn send_reply(&mut self, tasks: &mut Tasks) {
        let text = self.draft.trim().to_owned();
        let Some(conversation) = self.open_conversation.clone() else {
            self.cancel_reply();
            return;
        };
        if text.is_empty() {
            self.cancel_reply();
            return;
        }

        let reply_to = self
            .machine
            .remove_value("reply_to")
            .and_then(|value| value.as_i64())
            .map(MessageId::new);
        self.draft.clear();
        self.machine.set_state(AppState::ChatView, None);

        let client = Arc::clone(&self.client);
        let handle = conversation.handle.clone();
        let body = text.clone();
        let task = BackgroundTask::new("send_message", async move {
            client.send_message(&handle, &body, reply_to).await
        })
        .on_complete(move |state: &mut SessionState, tasks: &mut Tasks, ()| {
            info!(conversation = %conversation.id, "reply sent");
            state.show_banner(BannerLevel::Info, "reply sent");
            state.cache.invalidate_detail(Some(conversation.id));
            state.schedule_mark_read(tasks, &conversation, reply_to);
            if state.is_open(conversation.id) {
                state.refresh_messages(tasks, true);
            }
            Ok(())
        })
        .on_error(move |state: &mut SessionState, _: &mut Tasks, error| {
            state.show_banner(BannerLevel::Error, format!("failed to send reply: {error}"));
            if state.draft.is_empty() {
                state.draft = text;
            }
            Ok(())
        });
        tasks.schedule(task);
    }

    fn mark_open_conversation_read(&mut self, tasks: &mut Tasks) {
        if let Some(conversation) = self.open_conversation.clone() {
            self.schedule_mark_read(tasks, &conversation, None);
        }
    }

    fn schedule_mark_read(
        &mut self,
        tasks: &mut Tasks,
        conversation: &Conversation,
        up_to: Option<MessageId>,
    ) {
        let client = Arc::clone(&self.client);
        let handle = conversation.handle.clone();
        let conversation_id = conversation.id;
        let task = BackgroundTask::new("mark_read", async move {
            client.mark_read(&handle, up_to).await
        })
        .on_complete(move |state: &mut SessionState, _: &mut Tasks, ()| {
            debug!(conversation = %conversation_id, "marked as read");
            state.cache.invalidate_list();
            if let Some(open) = state.open_conversation.as_mut() {
                if open.id == conversation_id {
                    open.unread_count = 0;
                }
            }
            Ok(())
        })
        .on_error(move |state: &mut SessionState, _: &mut Tasks, error| {
            state.show_banner(BannerLevel::Error, format!("failed to mark as read: {error}"));
            Ok(())
        });
        tasks.schedule(task);
    }

    fn save_selected_attachment(&mut self, tasks: &mut Tasks) {
        let Some(message) = self.messages.get(self.selected_message).cloned() else {
            return;
        };
        if message.attachment.is_none() {
            self.show_banner(BannerLevel::Error, "selected message has no attachment");
            return;
        }

        let client = Arc::clone(&self.client);
        let task = BackgroundTask::new("download_attachment", async move {
            client.download_attachment(&message).await
        })
        .on_complete(move |state: &mut SessionState, _: &mut Tasks, saved: Option<PathBuf>| {
            match saved {
                Some(path) => {
                    info!(path = %path.display(), "attachment saved");
                    state.show_banner(
                        BannerLevel::Info,
                        format!("saved attachment to {}", path.display()),
                    );
                    if state.settings.open_after_download {
                        open_with_system_viewer(&path);
                    }
                }
                None => state.show_banner(BannerLevel::Error, "attachment could not be downloaded"),
            }
            Ok(())
        })
        .on_error(move |state: &mut SessionState, _: &mut Tasks, error| {
            state.show_banner(BannerLevel::Error, format!("download failed: {error}"));
            Ok(())
        });
        tasks.schedule(task);
    }

    fn reconnect(&mut self, tasks: &mut Tasks) {
        let client = Arc::clone(&self.client);
        let task = BackgroundTask::new("reconnect", async move {
            client.disconnect().await?;
            client.connect().await
        })
        .on_complete(move |state: &mut SessionState, tasks: &mut Tasks, ()| {
            info!("reconnected");
            state.show_banner(BannerLevel::Info, "reconnected");
            state.cache.invalidate_list();
            state.refresh_conversations(tasks, true);
            if state.open_conversation.is_some() {
                state.refresh_messages(tasks, true);
            }
            Ok(())
        })
        .on_error(move |state: &mut SessionState, _: &mut Tasks, error| {
            state.show_banner(BannerLevel::Error, format!("reconnect failed: {error}"));
            Ok(())
        });
        tasks.schedule(task);
    }

    fn show_banner(&mut self, level: BannerLevel, text: impl Into<String>) {
        self.banner = Some(Banner {
            text: text.into(),
            level,
            expires_at: Instant::now() + self.settings.banner_ttl,
        });
    }

    fn settings_lines(&self) -> Vec<String> {
        vec![
            format!("filter: {}", self.filter.label()),
            format!("conversations per fetch: {}", self.settings.conversations_limit),
            format!("messages per fetch: {}", self.settings.messages_limit),
            format!("cache ttl: {}s", self.cache.ttl().as_secs()),
            format!("cached message lists: {}", self.cache.cached_detail_count()),
            format!("download directory: {}", self.settings.download_dir.display()),
            format!(
                "open after download: {}",
                if self.settings.open_after_download { "yes" } else { "no" }
            ),
        ]
    }
}

fn open_with_system_viewer(path: &Path) {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    if let Err(err) = Command::new(opener)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        warn!(opener, path = %path.display(), error = %err, "failed to open downloaded file");
    }
}
