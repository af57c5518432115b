use chatterm_core::ChatError;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AppState {
    Init,
    ConversationList,
    ChatView,
    ReplyInput,
    Settings,
    Error,
}

impl AppState {
    pub const ALL: [AppState; 6] = [
        AppState::Init,
        AppState::ConversationList,
        AppState::ChatView,
        AppState::ReplyInput,
        AppState::Settings,
        AppState::Error,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ConversationList => "conversation list",
            Self::ChatView => "chat",
            Self::ReplyInput => "reply",
            Self::Settings => "settings",
            Self::Error => "error",
        }
    }
}

/// Scratch values carried across transitions, e.g. the open conversation id.
pub type StateData = serde_json::Map<String, Value>;

pub type StateListener = Box<dyn FnMut(&StateData) -> Result<(), ChatError>>;

/// Current/previous screen plus per-state change listeners.
///
/// Any state may follow any other; deciding which transitions make sense is
/// left to the command handlers.
pub struct StateMachine {
    current: AppState,
    previous: Option<AppState>,
    data: StateData,
    listeners: HashMap<AppState, Vec<StateListener>>,
}

impl StateMachine {
    pub fn new(initial: AppState) -> Self {
        Self {
            current: initial,
            previous: None,
            data: StateData::new(),
            listeners: HashMap::new(),
        }
    }

    pub fn state(&self) -> AppState {
        self.current
    }

    pub fn previous_state(&self) -> Option<AppState> {
        self.previous
    }

    pub fn data(&self) -> &StateData {
        &self.data
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove_value(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn register_listener<F>(&mut self, state: AppState, listener: F)
    where
        F: FnMut(&StateData) -> Result<(), ChatError> + 'static,
    {
        self.listeners
            .entry(state)
            .or_default()
            .push(Box::new(listener));
    }

    /// Returns `false` (and notifies nobody) when `next` is already current.
    pub fn set_state(&mut self, next: AppState, data: Option<StateData>) -> bool {
        if next == self.current {
            return false;
        }
        self.previous = Some(self.current);
        self.current = next;
        if let Some(data) = data {
            self.data.extend(data);
        }
        info!(from = ?self.previous, to = ?next, "screen state changed");

        if let Some(listeners) = self.listeners.get_mut(&next) {
            for (index, listener) in listeners.iter_mut().enumerate() {
                match panic::catch_unwind(AssertUnwindSafe(|| listener(&self.data))) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        warn!(state = ?next, index, error = %err, "state listener failed");
                    }
                    Err(_) => warn!(state = ?next, index, "state listener panicked"),
                }
            }
        }
        true
    }

    pub fn return_to_previous(&mut self) -> bool {
        match self.previous {
            Some(previous) => self.set_state(previous, None),
            None => false,
        }
    }
}
