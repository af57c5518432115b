use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("remote request failed: {0}")]
    Transient(String),
    #[error("a password is required to complete sign-in")]
    AuthChallenge,
    #[error("authorization failed: {0}")]
    Unauthorized(String),
    #[error("not connected to the messaging service")]
    NotConnected,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("callback failed: {0}")]
    Callback(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback(message.into())
    }

    /// Failures the user can simply re-trigger.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::NotConnected)
    }
}

impl From<std::io::Error> for ChatError {
    fn from(value: std::io::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(value: serde_json::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}
