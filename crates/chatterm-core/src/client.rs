use crate::error::ChatError;
use crate::identifiers::MessageId;
use crate::model::{Conversation, EntityHandle, Message};
use async_trait::async_trait;
use std::path::PathBuf;

/// Capability exposed by a remote messaging service.
///
/// Every call may suspend on the network; implementations report failures
/// through [`ChatError`] and never touch UI state.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn connect(&self) -> Result<(), ChatError>;

    async fn disconnect(&self) -> Result<(), ChatError>;

    async fn is_authorized(&self) -> Result<bool, ChatError>;

    async fn request_code(&self, phone: &str) -> Result<(), ChatError>;

    /// Fails with [`ChatError::AuthChallenge`] when a second factor is
    /// required and `password` is `None`.
    async fn sign_in(
        &self,
        phone: &str,
        code: &str,
        password: Option<&str>,
    ) -> Result<(), ChatError>;

    async fn list_conversations(
        &self,
        limit: usize,
        unread_only: bool,
    ) -> Result<Vec<Conversation>, ChatError>;

    async fn list_messages(
        &self,
        conversation: &EntityHandle,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError>;

    async fn send_message(
        &self,
        conversation: &EntityHandle,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), ChatError>;

    async fn mark_read(
        &self,
        conversation: &EntityHandle,
        up_to: Option<MessageId>,
    ) -> Result<(), ChatError>;

    async fn download_attachment(&self, message: &Message) -> Result<Option<PathBuf>, ChatError>;
}
