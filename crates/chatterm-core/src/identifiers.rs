use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! integer_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

integer_id!(ConversationId);
integer_id!(MessageId);

/// Which conversations a list fetch asked for. Doubles as the list-cache discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationFilter {
    All,
    #[default]
    UnreadOnly,
}

impl ConversationFilter {
    pub fn unread_only(self) -> bool {
        matches!(self, Self::UnreadOnly)
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::All => Self::UnreadOnly,
            Self::UnreadOnly => Self::All,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::UnreadOnly => "unread only",
        }
    }
}
