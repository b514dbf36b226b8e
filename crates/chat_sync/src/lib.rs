use std::sync::Arc;

use shared::domain::{
    ConnectionState, Identity, LocalId, Message, MessageId, ReactionKind, RoomTopic,
    ServerMessageId, UserId,
};
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{info, warn};

pub mod backend;
pub mod config;
mod delivery;
pub mod error;
pub mod http;
pub mod reactions;
pub mod reconcile;
mod room;
pub mod send;
pub mod store;

pub use backend::{ChatBackend, PushEvent, PushSubscription};
pub use config::{load_settings, SyncSettings};
pub use error::{ReactionError, SendError};
pub use http::HttpChatBackend;
pub use reactions::{ReactionSummaries, ReactionSummary, ToggleEffect};

use delivery::{QueuedToggle, RoomTasks};
use room::RoomView;
use send::SendCoordinator;

const EVENT_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    MessagesChanged {
        room: Option<RoomTopic>,
    },
    ReactionsChanged {
        room: Option<RoomTopic>,
        message_ids: Vec<ServerMessageId>,
    },
    ConnectionChanged {
        room: Option<RoomTopic>,
        state: ConnectionState,
    },
    SendFailed {
        local_id: LocalId,
        reason: String,
    },
    Error(String),
}

struct ActiveRoom {
    view: Arc<RoomView>,
    tasks: RoomTasks,
    reactions: mpsc::UnboundedSender<QueuedToggle>,
}

/// Keeps one open room in sync with the backend.
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    settings: SyncSettings,
    sender: SendCoordinator,
    active: Mutex<Option<ActiveRoom>>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, settings: SyncSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            backend,
            settings,
            sender: SendCoordinator::new(),
            active: Mutex::new(None),
            events,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    /// Switches to `topic` (`None` is the global room) and loads its latest
    /// messages. Returns early if another room is opened in the meantime.
    pub async fn open_room(&self, topic: Option<RoomTopic>) {
        let initial = {
            let mut active = self.active.lock().await;
            if let Some(mut previous) = active.take() {
                previous.tasks.cancel_all();
                info!(room = ?previous.view.topic(), "room closed");
            }

            let view = Arc::new(RoomView::new(
                topic.clone(),
                Arc::clone(&self.backend),
                self.settings.clone(),
                self.events.clone(),
            ));
            let mut tasks = RoomTasks::default();
            let initial = delivery::start(&view, &mut tasks);
            *active = Some(ActiveRoom {
                reactions: delivery::spawn_reaction_dispatch(Arc::clone(&view)),
                view,
                tasks,
            });
            info!(room = ?topic, "room opened");
            initial
        };

        if initial.await.is_err() {
            info!(room = ?topic, "initial load cancelled");
        }
    }

    pub async fn close_room(&self) {
        if let Some(mut previous) = self.active.lock().await.take() {
            previous.tasks.cancel_all();
            info!(room = ?previous.view.topic(), "room closed");
        }
    }

    pub async fn active_room(&self) -> Option<Option<RoomTopic>> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| active.view.topic().cloned())
    }

    pub async fn messages(&self) -> Vec<Message> {
        match self.current_view().await {
            Some(view) => view.messages().await,
            None => Vec::new(),
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.current_view()
            .await
            .map_or(ConnectionState::Unknown, |view| view.connection_state())
    }

    pub async fn reaction_summary(
        &self,
        message_id: &ServerMessageId,
        viewer: Option<&UserId>,
    ) -> ReactionSummaries {
        match self.current_view().await {
            Some(view) => view.reaction_summary(message_id, viewer).await,
            None => ReactionSummaries::default(),
        }
    }

    /// Failed sends are not retried.
    pub async fn send(
        &self,
        body: &str,
        identity: Option<&Identity>,
    ) -> Result<Message, SendError> {
        let view = self.current_view().await.ok_or(SendError::NoActiveRoom)?;
        self.sender.send(&view, body, identity).await
    }

    /// Applies the toggle locally and returns at once. Backend calls go out in
    /// toggle order and survive a room switch.
    pub async fn toggle_reaction(
        &self,
        message_id: &MessageId,
        kind: ReactionKind,
        identity: Option<&Identity>,
    ) -> Result<ToggleEffect, ReactionError> {
        let identity = identity.ok_or(ReactionError::MissingIdentity)?;
        let message_id = message_id
            .as_confirmed()
            .ok_or(ReactionError::PendingMessage)?
            .clone();

        let guard = self.active.lock().await;
        let active = guard.as_ref().ok_or(ReactionError::NoActiveRoom)?;
        let effect = active
            .view
            .apply_local_toggle(&message_id, &identity.user_id, kind)
            .await?;

        let queued = QueuedToggle {
            message_id,
            user: identity.user_id.clone(),
            kind,
        };
        if let Err(err) = active.reactions.send(queued) {
            warn!(message_id = %err.0.message_id, "reaction dispatch stopped; toggle not forwarded");
        }
        Ok(effect)
    }

    async fn current_view(&self) -> Option<Arc<RoomView>> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.view))
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
