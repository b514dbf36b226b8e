//! Wire payloads exchanged with the chat backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        ConnectionState, Message, MessageId, Reaction, ReactionId, ReactionKind, RoomTopic,
        ServerMessageId, UserId,
    },
    error::ApiError,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePayload {
    pub id: ServerMessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_topic: Option<RoomTopic>,
    pub sender_display_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<MessagePayload> for Message {
    fn from(value: MessagePayload) -> Self {
        Message {
            id: MessageId::Confirmed(value.id),
            room: value.room_topic,
            sender_display_name: value.sender_display_name,
            body: value.body,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionPayload {
    pub id: ReactionId,
    pub message_id: ServerMessageId,
    pub user_id: UserId,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

impl From<ReactionPayload> for Reaction {
    fn from(value: ReactionPayload) -> Self {
        Reaction {
            id: value.id,
            message_id: value.message_id,
            user_id: value.user_id,
            kind: value.kind,
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<RoomTopic>,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub sender_display_name: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_topic: Option<RoomTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchReactionsRequest {
    pub message_ids: Vec<ServerMessageId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleReactionRequest {
    pub message_id: ServerMessageId,
    pub user_id: UserId,
    pub kind: ReactionKind,
}

/// Frames pushed over the realtime socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Subscribed,
    MessageCreated { message: MessagePayload },
    ChannelError(ApiError),
    TimedOut,
}

impl ServerEvent {
    /// Channel status carried by this frame, if any.
    pub fn status(&self) -> Option<ConnectionState> {
        match self {
            ServerEvent::Subscribed => Some(ConnectionState::Subscribed),
            ServerEvent::ChannelError(_) => Some(ConnectionState::ChannelError),
            ServerEvent::TimedOut => Some(ConnectionState::TimedOut),
            ServerEvent::MessageCreated { .. } => None,
        }
    }
}
