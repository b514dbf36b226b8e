use shared::domain::ServerMessageId;
use thiserror::Error;

/// Outcome of a failed explicit send. Validation variants never reach the
/// backend and never create an optimistic entry.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("message body is empty")]
    EmptyBody,
    #[error("no signed-in identity")]
    MissingIdentity,
    #[error("no room is open")]
    NoActiveRoom,
    #[error("backend rejected message: {0}")]
    Backend(#[source] anyhow::Error),
}

impl SendError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyBody | Self::MissingIdentity)
    }
}

#[derive(Debug, Error)]
pub enum ReactionError {
    #[error("no signed-in identity")]
    MissingIdentity,
    #[error("no room is open")]
    NoActiveRoom,
    #[error("message is not confirmed yet")]
    PendingMessage,
    #[error("unknown message {0}")]
    UnknownMessage(ServerMessageId),
}
