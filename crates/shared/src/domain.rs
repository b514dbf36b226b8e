use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(RoomTopic);
id_newtype!(UserId);
id_newtype!(ServerMessageId);
id_newtype!(ReactionId);

/// Client-allocated id for a message that the backend has not confirmed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "temp-{}", self.0)
    }
}

/// Identity of a message. The id space is carried by the variant, never by
/// the shape of the string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    Pending(LocalId),
    Confirmed(ServerMessageId),
}

impl MessageId {
    pub fn confirmed(value: impl Into<String>) -> Self {
        Self::Confirmed(ServerMessageId::new(value))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    pub fn as_confirmed(&self) -> Option<&ServerMessageId> {
        match self {
            Self::Confirmed(id) => Some(id),
            Self::Pending(_) => None,
        }
    }

    pub fn as_pending(&self) -> Option<LocalId> {
        match self {
            Self::Pending(id) => Some(*id),
            Self::Confirmed(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending(id) => id.fmt(f),
            Self::Confirmed(id) => id.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    /// `None` is the global room.
    pub room: Option<RoomTopic>,
    /// Resolved once at send time and never re-resolved.
    pub sender_display_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.id.is_pending()
    }

    /// Whether `other` carries the same sender and body, which is how a
    /// confirmed echo is matched against its optimistic placeholder.
    pub fn same_content(&self, other: &Message) -> bool {
        self.sender_display_name == other.sender_display_name && self.body == other.body
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ReactionKind {
    #[serde(rename = "👍")]
    ThumbsUp,
    #[serde(rename = "❤️")]
    Heart,
    #[serde(rename = "😂")]
    Laugh,
    #[serde(rename = "🔥")]
    Fire,
    #[serde(rename = "😮")]
    Surprised,
    #[serde(rename = "😢")]
    Sad,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 6] = [
        ReactionKind::ThumbsUp,
        ReactionKind::Heart,
        ReactionKind::Laugh,
        ReactionKind::Fire,
        ReactionKind::Surprised,
        ReactionKind::Sad,
    ];

    pub fn emoji(self) -> &'static str {
        match self {
            ReactionKind::ThumbsUp => "👍",
            ReactionKind::Heart => "❤️",
            ReactionKind::Laugh => "😂",
            ReactionKind::Fire => "🔥",
            ReactionKind::Surprised => "😮",
            ReactionKind::Sad => "😢",
        }
    }

    pub fn from_emoji(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.emoji() == value)
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.emoji())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub id: ReactionId,
    pub message_id: ServerMessageId,
    pub user_id: UserId,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

/// Health of the push channel for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Unknown,
    Subscribed,
    ChannelError,
    TimedOut,
}

impl ConnectionState {
    pub fn is_failed(self) -> bool {
        matches!(self, Self::ChannelError | Self::TimedOut)
    }

    /// Applies a reported status. Returns the new state, or `None` when the
    /// transition is not allowed and the state must stay as it is.
    ///
    /// `Unknown -> Subscribed`, `Unknown | Subscribed -> ChannelError | TimedOut`.
    /// A failed channel only recovers through a fresh subscription.
    pub fn advance(self, next: ConnectionState) -> Option<ConnectionState> {
        match (self, next) {
            (Self::Unknown, Self::Subscribed) => Some(next),
            (Self::Unknown | Self::Subscribed, Self::ChannelError | Self::TimedOut) => Some(next),
            _ => None,
        }
    }
}

/// The signed-in identity, passed explicitly to operations that need it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            display_name: display_name.into(),
        }
    }
}
