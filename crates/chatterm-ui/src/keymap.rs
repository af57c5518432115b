use std::collections::HashMap;
use std::fmt;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::state_machine::AppState;

const MOD_SHIFT: u8 = 0b001;
const MOD_CONTROL: u8 = 0b010;
const MOD_ALT: u8 = 0b100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiCommand {
    Quit,
    Reconnect,
    Redraw,
    SelectPrevious,
    SelectNext,
    OpenConversation,
    ToggleFilter,
    OpenSettings,
    CloseSettings,
    BackToList,
    StartReply,
    SaveAttachment,
    MarkRead,
    SendReply,
    CancelReply,
    DeleteDraftChar,
    Retry,
}

impl UiCommand {
    pub const ALL: [UiCommand; 17] = [
        UiCommand::Quit,
        UiCommand::Reconnect,
        UiCommand::Redraw,
        UiCommand::SelectPrevious,
        UiCommand::SelectNext,
        UiCommand::OpenConversation,
        UiCommand::ToggleFilter,
        UiCommand::OpenSettings,
        UiCommand::CloseSettings,
        UiCommand::BackToList,
        UiCommand::StartReply,
        UiCommand::SaveAttachment,
        UiCommand::MarkRead,
        UiCommand::SendReply,
        UiCommand::CancelReply,
        UiCommand::DeleteDraftChar,
        UiCommand::Retry,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Quit => "app.quit",
            Self::Reconnect => "app.reconnect",
            Self::Redraw => "app.redraw",
            Self::SelectPrevious => "selection.previous",
            Self::SelectNext => "selection.next",
            Self::OpenConversation => "conversation.open",
            Self::ToggleFilter => "conversation.toggle_filter",
            Self::OpenSettings => "settings.open",
            Self::CloseSettings => "settings.close",
            Self::BackToList => "chat.back",
            Self::StartReply => "chat.reply",
            Self::SaveAttachment => "chat.save_attachment",
            Self::MarkRead => "chat.mark_read",
            Self::SendReply => "reply.send",
            Self::CancelReply => "reply.cancel",
            Self::DeleteDraftChar => "reply.delete_char",
            Self::Retry => "app.retry",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.id() == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeymapConfig {
    pub global: Vec<KeyBindingConfig>,
    pub states: Vec<StateKeymapConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateKeymapConfig {
    pub state: AppState,
    pub bindings: Vec<KeyBindingConfig>,
}

/// Every key in `keys` triggers `command_id` on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindingConfig {
    pub keys: Vec<String>,
    pub command_id: String,
}

impl KeyBindingConfig {
    fn new(keys: &[&str], command: UiCommand) -> Self {
        Self {
            keys: keys.iter().map(|key| (*key).to_owned()).collect(),
            command_id: command.id().to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingScope {
    Global,
    State(AppState),
}

impl fmt::Display for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::State(state) => write!(f, "{state:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeymapCompileError {
    DuplicateStateConfig {
        state: AppState,
    },
    UnknownCommandId {
        scope: BindingScope,
        command_id: String,
    },
    EmptyKeyList {
        scope: BindingScope,
        command_id: String,
    },
    InvalidKeyToken {
        scope: BindingScope,
        token: String,
        reason: String,
    },
    DuplicateBinding {
        scope: BindingScope,
        key: String,
    },
    ShadowedByGlobal {
        state: AppState,
        key: String,
    },
}

impl fmt::Display for KeymapCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateStateConfig { state } => {
                write!(f, "duplicate keymap config for state {state:?}")
            }
            Self::UnknownCommandId { scope, command_id } => {
                write!(f, "unknown command id '{command_id}' in {scope} keymap")
            }
            Self::EmptyKeyList { scope, command_id } => {
                write!(f, "binding for '{command_id}' in {scope} keymap has no keys")
            }
            Self::InvalidKeyToken {
                scope,
                token,
                reason,
            } => write!(f, "invalid key '{token}' in {scope} keymap: {reason}"),
            Self::DuplicateBinding { scope, key } => {
                write!(f, "key '{key}' is bound twice in {scope} keymap")
            }
            Self::ShadowedByGlobal { state, key } => write!(
                f,
                "key '{key}' in {state:?} keymap can never fire because it is a global binding"
            ),
        }
    }
}

impl std::error::Error for KeymapCompileError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDispatch {
    Command(UiCommand),
    Unhandled(KeyStroke),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyStroke {
    key: KeyCodeToken,
    modifiers: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum KeyCodeToken {
    Char(char),
    Up,
    Down,
    Left,
    Right,
    Tab,
    BackTab,
    Enter,
    Backspace,
    Esc,
}

impl KeyStroke {
    pub fn parse(token: &str) -> Result<Self, String> {
        parse_key_token(token)
    }

    /// The character this stroke types into a text field, if any.
    pub fn printable_char(&self) -> Option<char> {
        if self.modifiers & (MOD_CONTROL | MOD_ALT) != 0 {
            return None;
        }
        match self.key {
            KeyCodeToken::Char(ch) if !ch.is_control() => {
                if self.modifiers & MOD_SHIFT != 0 && ch.is_ascii_lowercase() {
                    Some(ch.to_ascii_uppercase())
                } else {
                    Some(ch)
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for KeyStroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.modifiers & MOD_CONTROL != 0 {
            parts.push("ctrl".to_owned());
        }
        if self.modifiers & MOD_ALT != 0 {
            parts.push("alt".to_owned());
        }
        if self.modifiers & MOD_SHIFT != 0 {
            parts.push("shift".to_owned());
        }
        let key = match self.key {
            KeyCodeToken::Char(ch) => ch.to_string(),
            KeyCodeToken::Up => "up".to_owned(),
            KeyCodeToken::Down => "down".to_owned(),
            KeyCodeToken::Left => "left".to_owned(),
            KeyCodeToken::Right => "right".to_owned(),
            KeyCodeToken::Tab => "tab".to_owned(),
            KeyCodeToken::BackTab => "backtab".to_owned(),
            KeyCodeToken::Enter => "enter".to_owned(),
            KeyCodeToken::Backspace => "backspace".to_owned(),
            KeyCodeToken::Esc => "esc".to_owned(),
        };
        parts.push(key);
        write!(f, "{}", parts.join("+"))
    }
}

/// Two-level lookup: global bindings first, then the current state's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keymap {
    global: HashMap<KeyStroke, UiCommand>,
    states: HashMap<AppState, HashMap<KeyStroke, UiCommand>>,
}

impl Keymap {
    pub fn compile(config: &KeymapConfig) -> Result<Self, KeymapCompileError> {
        let global = compile_table(BindingScope::Global, &config.global)?;

        let mut states = HashMap::new();
        for state_config in &config.states {
            if states.contains_key(&state_config.state) {
                return Err(KeymapCompileError::DuplicateStateConfig {
                    state: state_config.state,
                });
            }
            let table = compile_table(
                BindingScope::State(state_config.state),
                &state_config.bindings,
            )?;
            if let Some(shadowed) = table.keys().find(|key| global.contains_key(key)) {
                return Err(KeymapCompileError::ShadowedByGlobal {
                    state: state_config.state,
                    key: shadowed.to_string(),
                });
            }
            states.insert(state_config.state, table);
        }

        Ok(Self { global, states })
    }

    pub fn dispatch(&self, state: AppState, stroke: KeyStroke) -> KeyDispatch {
        if let Some(command) = self.global.get(&stroke) {
            return KeyDispatch::Command(*command);
        }
        self.states
            .get(&state)
            .and_then(|table| table.get(&stroke))
            .map_or(KeyDispatch::Unhandled(stroke), |command| {
                KeyDispatch::Command(*command)
            })
    }
}

fn compile_table(
    scope: BindingScope,
    bindings: &[KeyBindingConfig],
) -> Result<HashMap<KeyStroke, UiCommand>, KeymapCompileError> {
    let mut table = HashMap::new();
    for binding in bindings {
        let command = UiCommand::from_id(&binding.command_id).ok_or_else(|| {
            KeymapCompileError::UnknownCommandId {
                scope,
                command_id: binding.command_id.clone(),
            }
        })?;
        if binding.keys.is_empty() {
            return Err(KeymapCompileError::EmptyKeyList {
                scope,
                command_id: binding.command_id.clone(),
            });
        }
        for token in &binding.keys {
            let stroke =
                parse_key_token(token).map_err(|reason| KeymapCompileError::InvalidKeyToken {
                    scope,
                    token: token.clone(),
                    reason,
                })?;
            if table.insert(stroke, command).is_some() {
                return Err(KeymapCompileError::DuplicateBinding {
                    scope,
                    key: stroke.to_string(),
                });
            }
        }
    }
    Ok(table)
}

pub fn default_keymap_config() -> KeymapConfig {
    use UiCommand::*;

    KeymapConfig {
        global: vec![
            KeyBindingConfig::new(&["ctrl+c"], Quit),
            KeyBindingConfig::new(&["ctrl+r"], Reconnect),
            KeyBindingConfig::new(&["ctrl+l"], Redraw),
        ],
        states: vec![
            StateKeymapConfig {
                state: AppState::Init,
                bindings: vec![KeyBindingConfig::new(&["q"], Quit)],
            },
            StateKeymapConfig {
                state: AppState::ConversationList,
                bindings: vec![
                    KeyBindingConfig::new(&["up", "k"], SelectPrevious),
                    KeyBindingConfig::new(&["down", "j"], SelectNext),
                    KeyBindingConfig::new(&["right", "enter"], OpenConversation),
                    KeyBindingConfig::new(&["tab"], ToggleFilter),
                    KeyBindingConfig::new(&["o"], OpenSettings),
                    KeyBindingConfig::new(&["q"], Quit),
                ],
            },
            StateKeymapConfig {
                state: AppState::ChatView,
                bindings: vec![
                    KeyBindingConfig::new(&["up", "k"], SelectPrevious),
                    KeyBindingConfig::new(&["down", "j"], SelectNext),
                    KeyBindingConfig::new(&["left", "q"], BackToList),
                    KeyBindingConfig::new(&["r"], StartReply),
                    KeyBindingConfig::new(&["s"], SaveAttachment),
                    KeyBindingConfig::new(&["m"], MarkRead),
                ],
            },
            StateKeymapConfig {
                state: AppState::ReplyInput,
                bindings: vec![
                    KeyBindingConfig::new(&["enter"], SendReply),
                    KeyBindingConfig::new(&["esc"], CancelReply),
                    KeyBindingConfig::new(&["backspace"], DeleteDraftChar),
                ],
            },
            StateKeymapConfig {
                state: AppState::Settings,
                bindings: vec![KeyBindingConfig::new(&["esc", "q", "left"], CloseSettings)],
            },
            StateKeymapConfig {
                state: AppState::Error,
                bindings: vec![
                    KeyBindingConfig::new(&["r"], Retry),
                    KeyBindingConfig::new(&["q"], Quit),
                ],
            },
        ],
    }
}

fn parse_key_token(raw: &str) -> Result<KeyStroke, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("token is empty".to_owned());
    }

    let parts = trimmed.split('+').collect::<Vec<_>>();
    let mut modifiers = 0u8;
    for modifier in &parts[..parts.len() - 1] {
        match modifier.trim().to_ascii_lowercase().as_str() {
            "shift" => modifiers |= MOD_SHIFT,
            "ctrl" | "control" => modifiers |= MOD_CONTROL,
            "alt" => modifiers |= MOD_ALT,
            _ => return Err(format!("unknown modifier '{modifier}'")),
        }
    }

    let key_part = parts[parts.len() - 1].trim();
    if key_part.is_empty() {
        return Err("missing key after modifier".to_owned());
    }

    let key = match key_part.to_ascii_lowercase().as_str() {
        "up" => KeyCodeToken::Up,
        "down" => KeyCodeToken::Down,
        "left" => KeyCodeToken::Left,
        "right" => KeyCodeToken::Right,
        "tab" => KeyCodeToken::Tab,
        "backtab" => KeyCodeToken::BackTab,
        "enter" => KeyCodeToken::Enter,
        "backspace" => KeyCodeToken::Backspace,
        "esc" | "escape" => KeyCodeToken::Esc,
        "space" => KeyCodeToken::Char(' '),
        _ => {
            let mut chars = key_part.chars();
            let Some(mut ch) = chars.next() else {
                return Err("missing key token".to_owned());
            };
            if chars.next().is_some() {
                return Err("keys must be single chars or named keys (up/enter/esc/etc.)".to_owned());
            }
            if ch.is_ascii_uppercase() {
                ch = ch.to_ascii_lowercase();
                modifiers |= MOD_SHIFT;
            }
            KeyCodeToken::Char(ch)
        }
    };

    Ok(KeyStroke { key, modifiers })
}

pub fn key_stroke_from_event(event: KeyEvent) -> Option<KeyStroke> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    let mut modifiers = normalize_modifiers(event.modifiers);
    let key = match event.code {
        KeyCode::Char(mut ch) => {
            if ch.is_ascii_uppercase() {
                ch = ch.to_ascii_lowercase();
                modifiers |= MOD_SHIFT;
            }
            KeyCodeToken::Char(ch)
        }
        KeyCode::Up => KeyCodeToken::Up,
        KeyCode::Down => KeyCodeToken::Down,
        KeyCode::Left => KeyCodeToken::Left,
        KeyCode::Right => KeyCodeToken::Right,
        KeyCode::Tab if modifiers & MOD_SHIFT != 0 => KeyCodeToken::BackTab,
        KeyCode::Tab => KeyCodeToken::Tab,
        KeyCode::BackTab => KeyCodeToken::BackTab,
        KeyCode::Enter => KeyCodeToken::Enter,
        KeyCode::Backspace => KeyCodeToken::Backspace,
        KeyCode::Esc => KeyCodeToken::Esc,
        _ => return None,
    };

    if key == KeyCodeToken::BackTab {
        modifiers &= !MOD_SHIFT;
    }

    Some(KeyStroke { key, modifiers })
}

fn normalize_modifiers(modifiers: KeyModifiers) -> u8 {
    let mut normalized = 0u8;
    if modifiers.contains(KeyModifiers::SHIFT) {
        normalized |= MOD_SHIFT;
    }
    if modifiers.contains(KeyModifiers::CONTROL) {
        normalized |= MOD_CONTROL;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        normalized |= MOD_ALT;
    }
    normalized
}
