//! Offline [`MessagingClient`] backed by JSON fixture data.
//!
//! Used as the default backend of the binary and as the fake remote service in
//! tests. Failures can be queued per operation with [`FixtureClient::fail_next`].

use crate::client::MessagingClient;
use crate::error::ChatError;
use crate::identifiers::{ConversationId, MessageId};
use crate::model::{
    Attachment, Conversation, EntityHandle, Message, RemoteEntity, sender_display_name,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;
use tracing::debug;

const DEFAULT_LOGIN_CODE: &str = "12345";
const DEFAULT_SELF_NAME: &str = "me";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureData {
    #[serde(default = "default_authorized")]
    pub authorized: bool,
    #[serde(default = "default_login_code")]
    pub login_code: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_self_name")]
    pub self_name: String,
    #[serde(default)]
    pub conversations: Vec<FixtureConversation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureConversation {
    pub id: ConversationId,
    pub entity: RemoteEntity,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub messages: Vec<FixtureMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureMessage {
    pub id: MessageId,
    #[serde(default)]
    pub sender: Option<RemoteEntity>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

fn default_authorized() -> bool {
    true
}

fn default_login_code() -> String {
    DEFAULT_LOGIN_CODE.to_owned()
}

fn default_self_name() -> String {
    DEFAULT_SELF_NAME.to_owned()
}

impl FixtureData {
    pub fn from_json_str(raw: &str) -> Result<Self, ChatError> {
        serde_json::from_str(raw)
            .map_err(|err| ChatError::Configuration(format!("invalid fixture data: {err}")))
    }

    pub fn load(path: &Path) -> Result<Self, ChatError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ChatError::Configuration(format!(
                "failed to read fixture file {}: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw)
    }

    /// A small mixed inbox used when no fixture file is configured.
    pub fn sample() -> Self {
        let ada = RemoteEntity::user("Ada", Some("Lovelace"));
        let grace = RemoteEntity::user("Grace", Some("Hopper"));
        let linus = RemoteEntity::user("Linus", None);
        Self {
            authorized: true,
            login_code: default_login_code(),
            password: None,
            self_name: default_self_name(),
            conversations: vec![
                FixtureConversation {
                    id: ConversationId::new(101),
                    entity: ada.clone(),
                    unread_count: 2,
                    messages: vec![
                        sample_message(
                            1,
                            Some(&ada),
                            "Did the engine notes arrive?",
                            None,
                            datetime!(2024-05-02 09:12:04 UTC),
                        ),
                        sample_message(
                            2,
                            None,
                            "",
                            Some(Attachment::Document {
                                file_name: Some("engine-notes.pdf".to_owned()),
                                size_bytes: Some(482_133),
                            }),
                            datetime!(2024-05-02 09:15:40 UTC),
                        ),
                        sample_message(
                            3,
                            Some(&ada),
                            "Perfect. The section on loops is the part I would like you to read \
                             twice, since the rest depends on it.",
                            None,
                            datetime!(2024-05-02 09:21:11 UTC),
                        ),
                    ],
                },
                FixtureConversation {
                    id: ConversationId::new(202),
                    entity: RemoteEntity::group("Rust Meetup"),
                    unread_count: 5,
                    messages: vec![
                        sample_message(
                            10,
                            Some(&linus),
                            "Slides from last night are up.",
                            None,
                            datetime!(2024-05-01 20:02:00 UTC),
                        ),
                        sample_message(
                            11,
                            Some(&grace),
                            "",
                            Some(Attachment::Photo {
                                width: 1280,
                                height: 960,
                            }),
                            datetime!(2024-05-01 20:05:30 UTC),
                        ),
                        sample_message(
                            12,
                            Some(&ada),
                            "Next session:\nborrow checker deep dive\nbring questions",
                            None,
                            datetime!(2024-05-01 20:11:45 UTC),
                        ),
                        sample_message(
                            13,
                            Some(&linus),
                            "",
                            Some(Attachment::Animation {
                                width: 320,
                                height: 240,
                            }),
                            datetime!(2024-05-01 20:12:10 UTC),
                        ),
                        sample_message(
                            14,
                            Some(&grace),
                            "Venue confirmed for the first Thursday of the month, doors open at \
                             six and talks start at half past.",
                            None,
                            datetime!(2024-05-01 20:30:00 UTC),
                        ),
                    ],
                },
                FixtureConversation {
                    id: ConversationId::new(303),
                    entity: RemoteEntity::channel("Release Notes"),
                    unread_count: 0,
                    messages: vec![sample_message(
                        20,
                        None,
                        "Version 2.3 is out.",
                        Some(Attachment::Video {
                            duration_secs: Some(95),
                        }),
                        datetime!(2024-04-28 15:00:00 UTC),
                    )],
                },
                FixtureConversation {
                    id: ConversationId::new(404),
                    entity: grace.clone(),
                    unread_count: 0,
                    messages: vec![
                        sample_message(
                            30,
                            Some(&grace),
                            "",
                            Some(Attachment::Voice {
                                duration_secs: Some(12),
                            }),
                            datetime!(2024-04-30 08:00:00 UTC),
                        ),
                        sample_message(
                            31,
                            Some(&grace),
                            "Found the tune I mentioned.",
                            Some(Attachment::Audio {
                                performer: Some("Nina Simone".to_owned()),
                                title: Some("Sinnerman".to_owned()),
                                duration_secs: Some(620),
                            }),
                            datetime!(2024-04-30 08:01:00 UTC),
                        ),
                    ],
                },
                FixtureConversation {
                    id: ConversationId::new(505),
                    entity: RemoteEntity::group(""),
                    unread_count: 1,
                    messages: vec![sample_message(
                        40,
                        None,
                        "",
                        None,
                        datetime!(2024-04-29 11:11:11 UTC),
                    )],
                },
            ],
        }
    }
}

fn sample_message(
    id: i64,
    sender: Option<&RemoteEntity>,
    text: &str,
    attachment: Option<Attachment>,
    sent_at: OffsetDateTime,
) -> FixtureMessage {
    FixtureMessage {
        id: MessageId::new(id),
        sender: sender.cloned(),
        text: text.to_owned(),
        attachment,
        sent_at,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureOperation {
    Connect,
    ListConversations,
    ListMessages,
    SendMessage,
    MarkRead,
    DownloadAttachment,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixtureCalls {
    pub connect: usize,
    pub list_conversations: usize,
    pub list_messages: usize,
    pub send_message: usize,
    pub mark_read: usize,
    pub download_attachment: usize,
    /// Target of the most recent successful `send_message`.
    pub last_reply_to: Option<MessageId>,
}

#[derive(Debug)]
struct FixtureState {
    data: FixtureData,
    connected: bool,
    authorized: bool,
    code_requested_for: Option<String>,
    calls: FixtureCalls,
    failures: HashMap<FixtureOperation, VecDeque<ChatError>>,
}

impl FixtureState {
    fn record(&mut self, operation: FixtureOperation) -> Result<(), ChatError> {
        let counter = match operation {
            FixtureOperation::Connect => &mut self.calls.connect,
            FixtureOperation::ListConversations => &mut self.calls.list_conversations,
            FixtureOperation::ListMessages => &mut self.calls.list_messages,
            FixtureOperation::SendMessage => &mut self.calls.send_message,
            FixtureOperation::MarkRead => &mut self.calls.mark_read,
            FixtureOperation::DownloadAttachment => &mut self.calls.download_attachment,
        };
        *counter += 1;
        if let Some(error) = self
            .failures
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            debug!(?operation, %error, "fixture client returning queued failure");
            return Err(error);
        }
        if operation != FixtureOperation::Connect && !self.connected {
            return Err(ChatError::NotConnected);
        }
        Ok(())
    }

    fn conversation_mut(
        &mut self,
        handle: &EntityHandle,
    ) -> Result<&mut FixtureConversation, ChatError> {
        self.data
            .conversations
            .iter_mut()
            .find(|conversation| conversation.id == handle.peer())
            .ok_or_else(|| {
                ChatError::transient(format!("conversation {} not found", handle.peer()))
            })
    }
}

#[derive(Debug)]
pub struct FixtureClient {
    state: Mutex<FixtureState>,
    latency: Duration,
    download_dir: PathBuf,
}

impl FixtureClient {
    pub fn new(data: FixtureData, download_dir: impl Into<PathBuf>) -> Self {
        let authorized = data.authorized;
        Self {
            state: Mutex::new(FixtureState {
                data,
                connected: false,
                authorized,
                code_requested_for: None,
                calls: FixtureCalls::default(),
                failures: HashMap::new(),
            }),
            latency: Duration::ZERO,
            download_dir: download_dir.into(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue `error` as the result of the next call to `operation`.
    pub fn fail_next(
        &self,
        operation: FixtureOperation,
        error: ChatError,
    ) -> Result<(), ChatError> {
        self.lock()?
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
        Ok(())
    }

    pub fn calls(&self) -> Result<FixtureCalls, ChatError> {
        Ok(self.lock()?.calls)
    }

    pub fn unread_count(&self, conversation: ConversationId) -> Result<Option<u32>, ChatError> {
        Ok(self
            .lock()?
            .data
            .conversations
            .iter()
            .find(|candidate| candidate.id == conversation)
            .map(|candidate| candidate.unread_count))
    }

    fn lock(&self) -> Result<MutexGuard<'_, FixtureState>, ChatError> {
        self.state
            .lock()
            .map_err(|_| ChatError::Internal("fixture client state lock poisoned".to_owned()))
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn to_message(conversation: ConversationId, message: &FixtureMessage) -> Message {
    Message {
        id: message.id,
        conversation_id: conversation,
        sender: sender_display_name(message.sender.as_ref()),
        text: message.text.clone(),
        attachment: message.attachment.clone(),
        sent_at: message.sent_at,
    }
}

#[async_trait]
impl MessagingClient for FixtureClient {
    async fn connect(&self) -> Result<(), ChatError> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        state.record(FixtureOperation::Connect)?;
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChatError> {
        self.lock()?.connected = false;
        Ok(())
    }

    async fn is_authorized(&self) -> Result<bool, ChatError> {
        let state = self.lock()?;
        if !state.connected {
            return Err(ChatError::NotConnected);
        }
        Ok(state.authorized)
    }

    async fn request_code(&self, phone: &str) -> Result<(), ChatError> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        if !state.connected {
            return Err(ChatError::NotConnected);
        }
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(ChatError::Unauthorized("phone number is required".to_owned()));
        }
        state.code_requested_for = Some(phone.to_owned());
        Ok(())
    }

    async fn sign_in(
        &self,
        phone: &str,
        code: &str,
        password: Option<&str>,
    ) -> Result<(), ChatError> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        if !state.connected {
            return Err(ChatError::NotConnected);
        }
        if state.code_requested_for.as_deref() != Some(phone.trim()) {
            return Err(ChatError::Unauthorized(
                "no login code was requested for this phone number".to_owned(),
            ));
        }
        if code.trim() != state.data.login_code {
            return Err(ChatError::Unauthorized("invalid login code".to_owned()));
        }
        if let Some(expected) = state.data.password.as_deref() {
            match password {
                None => return Err(ChatError::AuthChallenge),
                Some(supplied) if supplied != expected => {
                    return Err(ChatError::Unauthorized("invalid password".to_owned()));
                }
                Some(_) => {}
            }
        }
        state.authorized = true;
        Ok(())
    }

    async fn list_conversations(
        &self,
        limit: usize,
        unread_only: bool,
    ) -> Result<Vec<Conversation>, ChatError> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        state.record(FixtureOperation::ListConversations)?;
        Ok(state
            .data
            .conversations
            .iter()
            .filter(|conversation| !unread_only || conversation.unread_count > 0)
            .take(limit)
            .map(|conversation| {
                Conversation::new(
                    conversation.id,
                    conversation.entity.clone(),
                    conversation.unread_count,
                )
            })
            .collect())
    }

    async fn list_messages(
        &self,
        conversation: &EntityHandle,
        limit: usize,
    ) -> Result<Vec<Message>, ChatError> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        state.record(FixtureOperation::ListMessages)?;
        let found = state.conversation_mut(conversation)?;
        let conversation_id = found.id;
        let mut messages: Vec<Message> = found
            .messages
            .iter()
            .map(|message| to_message(conversation_id, message))
            .collect();
        messages.sort_by(|left, right| right.id.cmp(&left.id));
        messages.truncate(limit);
        Ok(messages)
    }

    async fn send_message(
        &self,
        conversation: &EntityHandle,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), ChatError> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        state.record(FixtureOperation::SendMessage)?;
        let self_name = state.data.self_name.clone();
        let found = state.conversation_mut(conversation)?;
        if let Some(reply_to) = reply_to {
            if !found.messages.iter().any(|message| message.id == reply_to) {
                return Err(ChatError::transient(format!(
                    "reply target {reply_to} not found"
                )));
            }
        }
        let next_id = found
            .messages
            .iter()
            .map(|message| message.id.get())
            .max()
            .unwrap_or(0)
            + 1;
        found.messages.push(FixtureMessage {
            id: MessageId::new(next_id),
            sender: Some(RemoteEntity::user(self_name, None)),
            text: text.to_owned(),
            attachment: None,
            sent_at: OffsetDateTime::now_utc(),
        });
        state.calls.last_reply_to = reply_to;
        Ok(())
    }

    async fn mark_read(
        &self,
        conversation: &EntityHandle,
        _up_to: Option<MessageId>,
    ) -> Result<(), ChatError> {
        self.simulate_latency().await;
        let mut state = self.lock()?;
        state.record(FixtureOperation::MarkRead)?;
        state.conversation_mut(conversation)?.unread_count = 0;
        Ok(())
    }

    async fn download_attachment(&self, message: &Message) -> Result<Option<PathBuf>, ChatError> {
        self.simulate_latency().await;
        let planned = {
            let mut state = self.lock()?;
            state.record(FixtureOperation::DownloadAttachment)?;
            let attachment = state
                .data
                .conversations
                .iter()
                .find(|conversation| conversation.id == message.conversation_id)
                .and_then(|conversation| {
                    conversation
                        .messages
                        .iter()
                        .find(|candidate| candidate.id == message.id)
                })
                .and_then(|found| found.attachment.clone());
            attachment.map(|attachment| {
                let file_name = attachment
                    .download_file_name(message.id, OffsetDateTime::now_utc().unix_timestamp());
                (self.download_dir.join(file_name), attachment.preview_text())
            })
        };
        let Some((path, preview)) = planned else {
            return Ok(None);
        };

        tokio::fs::create_dir_all(&self.download_dir).await?;
        tokio::fs::write(&path, format!("chatterm fixture attachment {preview}\n")).await?;
        debug!(path = %path.display(), "fixture attachment written");
        Ok(Some(path))
    }
}
