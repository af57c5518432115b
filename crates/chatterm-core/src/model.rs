use crate::identifiers::{ConversationId, MessageId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;

const UNKNOWN_NAME: &str = "unknown";
const UNKNOWN_SENDER: &str = "unknown sender";
const EMPTY_MESSAGE: &str = "[empty message]";

/// A remote identity as the messaging service describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteEntity {
    User {
        first_name: String,
        #[serde(default)]
        last_name: Option<String>,
    },
    Group {
        title: String,
    },
    Channel {
        title: String,
    },
}

impl RemoteEntity {
    pub fn user(first_name: impl Into<String>, last_name: Option<&str>) -> Self {
        Self::User {
            first_name: first_name.into(),
            last_name: last_name.map(str::to_owned),
        }
    }

    pub fn group(title: impl Into<String>) -> Self {
        Self::Group {
            title: title.into(),
        }
    }

    pub fn channel(title: impl Into<String>) -> Self {
        Self::Channel {
            title: title.into(),
        }
    }

    /// Title when present, otherwise the non-empty name parts.
    pub fn name(&self) -> Option<String> {
        match self {
            Self::Group { title } | Self::Channel { title } => {
                let title = title.trim();
                (!title.is_empty()).then(|| title.to_owned())
            }
            Self::User {
                first_name,
                last_name,
            } => {
                let parts: Vec<&str> = [Some(first_name.as_str()), last_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .collect();
                (!parts.is_empty()).then(|| parts.join(" "))
            }
        }
    }

    pub fn display_name(&self) -> String {
        self.name().unwrap_or_else(|| UNKNOWN_NAME.to_owned())
    }
}

pub fn sender_display_name(sender: Option<&RemoteEntity>) -> String {
    sender
        .and_then(RemoteEntity::name)
        .unwrap_or_else(|| UNKNOWN_SENDER.to_owned())
}

/// Read-only reference into the client's object graph.
#[derive(Clone, PartialEq, Eq)]
pub struct EntityHandle {
    peer: ConversationId,
    entity: Arc<RemoteEntity>,
}

impl EntityHandle {
    pub fn new(peer: ConversationId, entity: RemoteEntity) -> Self {
        Self {
            peer,
            entity: Arc::new(entity),
        }
    }

    pub fn peer(&self) -> ConversationId {
        self.peer
    }

    pub fn entity(&self) -> &RemoteEntity {
        &self.entity
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityHandle")
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub name: String,
    pub unread_count: u32,
    pub handle: EntityHandle,
}

impl Conversation {
    pub fn new(id: ConversationId, entity: RemoteEntity, unread_count: u32) -> Self {
        let name = entity.display_name();
        Self {
            id,
            name,
            unread_count,
            handle: EntityHandle::new(id, entity),
        }
    }

    pub fn has_unread(&self) -> bool {
        self.unread_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender: String,
    pub text: String,
    pub attachment: Option<Attachment>,
    pub sent_at: OffsetDateTime,
}

impl Message {
    /// Text shown for the message body; never empty.
    pub fn body_text(&self) -> String {
        if !self.text.is_empty() {
            return self.text.clone();
        }
        match &self.attachment {
            Some(attachment) => format!("[{}]", attachment.kind_label()),
            None => EMPTY_MESSAGE.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Attachment {
    Photo {
        width: u32,
        height: u32,
    },
    Document {
        #[serde(default)]
        file_name: Option<String>,
        #[serde(default)]
        size_bytes: Option<u64>,
    },
    Video {
        #[serde(default)]
        duration_secs: Option<u32>,
    },
    Animation {
        width: u32,
        height: u32,
    },
    Voice {
        #[serde(default)]
        duration_secs: Option<u32>,
    },
    Audio {
        #[serde(default)]
        performer: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        duration_secs: Option<u32>,
    },
    Unknown,
}

impl Attachment {
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Photo { .. } => "Photo",
            Self::Document { .. } => "Document",
            Self::Video { .. } => "Video",
            Self::Animation { .. } => "Animation",
            Self::Voice { .. } => "Voice",
            Self::Audio { .. } => "Audio",
            Self::Unknown => "Media",
        }
    }

    pub fn preview_text(&self) -> String {
        match self {
            Self::Photo { width, height } => format!("[PHOTO {width}x{height}]"),
            Self::Document {
                file_name: Some(file_name),
                ..
            } if !file_name.is_empty() => format!("[FILE: {file_name}]"),
            Self::Document {
                size_bytes: Some(size),
                ..
            } => format!("[DOCUMENT {}]", format_size(*size)),
            Self::Document { .. } => "[DOCUMENT]".to_owned(),
            Self::Video {
                duration_secs: Some(duration),
            } => format!("[VIDEO {}]", format_duration(*duration)),
            Self::Video { .. } => "[VIDEO]".to_owned(),
            Self::Animation { width, height } => format!("[GIF {width}x{height}]"),
            Self::Voice {
                duration_secs: Some(duration),
            } => format!("[VOICE {}]", format_duration(*duration)),
            Self::Voice { .. } => "[VOICE]".to_owned(),
            Self::Audio {
                performer,
                title,
                duration_secs,
            } => match (performer.as_deref(), title.as_deref(), duration_secs) {
                (Some(performer), Some(title), _) => format!("[AUDIO: {performer} - {title}]"),
                (None, Some(title), _) | (Some(title), None, _) => format!("[AUDIO: {title}]"),
                (None, None, Some(duration)) => format!("[AUDIO {}]", format_duration(*duration)),
                (None, None, None) => "[AUDIO]".to_owned(),
            },
            Self::Unknown => "[MEDIA]".to_owned(),
        }
    }

    pub fn file_extension(&self) -> String {
        if let Self::Document {
            file_name: Some(file_name),
            ..
        } = self
        {
            if let Some((stem, extension)) = file_name.rsplit_once('.') {
                if !stem.is_empty() && !extension.is_empty() {
                    return extension.to_ascii_lowercase();
                }
            }
        }
        match self {
            Self::Photo { .. } => "jpg",
            Self::Video { .. } => "mp4",
            Self::Animation { .. } => "gif",
            Self::Voice { .. } => "ogg",
            Self::Audio { .. } => "mp3",
            Self::Document { .. } | Self::Unknown => "bin",
        }
        .to_owned()
    }

    pub fn download_file_name(&self, message_id: MessageId, unix_secs: i64) -> String {
        format!(
            "chatterm_{}_{unix_secs}.{}",
            message_id.get(),
            self.file_extension()
        )
    }
}

fn format_duration(total_secs: u32) -> String {
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    let bytes = bytes as f64;
    if bytes < MIB {
        format!("{:.1} KB", bytes / KIB)
    } else {
        format!("{:.1} MB", bytes / MIB)
    }
}
