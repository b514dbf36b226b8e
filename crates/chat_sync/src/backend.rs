use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{
    ConnectionState, Message, Reaction, ReactionKind, RoomTopic, ServerMessageId, UserId,
};
use tokio::{sync::mpsc, task::JoinHandle};

/// Operations the synchronization core needs from the chat backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Newest `limit` confirmed messages of the room, oldest first.
    async fn fetch_messages(&self, room: Option<&RoomTopic>, limit: u32) -> Result<Vec<Message>>;

    async fn subscribe(&self, room: Option<&RoomTopic>) -> Result<PushSubscription>;

    async fn send_message(
        &self,
        sender_display_name: &str,
        body: &str,
        room: Option<&RoomTopic>,
    ) -> Result<Message>;

    async fn fetch_reactions(
        &self,
        message_ids: &[ServerMessageId],
    ) -> Result<HashMap<ServerMessageId, Vec<Reaction>>>;

    async fn toggle_reaction(
        &self,
        message_id: &ServerMessageId,
        user_id: &UserId,
        kind: ReactionKind,
    ) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Message(Message),
    Status(ConnectionState),
}

/// A live push registration. Dropping it, or calling
/// [`PushSubscription::unsubscribe`], releases the underlying channel.
#[derive(Debug)]
pub struct PushSubscription {
    events: mpsc::Receiver<PushEvent>,
    reader: Option<JoinHandle<()>>,
}

impl PushSubscription {
    pub fn with_reader(events: mpsc::Receiver<PushEvent>, reader: JoinHandle<()>) -> Self {
        Self {
            events,
            reader: Some(reader),
        }
    }

    pub fn from_channel(events: mpsc::Receiver<PushEvent>) -> Self {
        Self {
            events,
            reader: None,
        }
    }

    /// Next event, or `None` once the channel has closed.
    pub async fn next_event(&mut self) -> Option<PushEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.events.close();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.release();
    }
}
