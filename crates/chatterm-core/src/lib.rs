mod client;
mod error;
mod fixture;
mod identifiers;
mod model;
pub mod test_support;

pub use client::MessagingClient;
pub use error::ChatError;
pub use fixture::{
    FixtureCalls, FixtureClient, FixtureConversation, FixtureData, FixtureMessage,
    FixtureOperation,
};
pub use identifiers::{ConversationFilter, ConversationId, MessageId};
pub use model::{
    Attachment, Conversation, EntityHandle, Message, RemoteEntity, sender_display_name,
};
