use std::sync::Arc;

use chrono::Utc;
use shared::domain::{
    ConnectionState, LocalId, Message, MessageId, ReactionKind, RoomTopic, ServerMessageId,
    UserId,
};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

use crate::{
    backend::ChatBackend,
    config::SyncSettings,
    error::ReactionError,
    reactions::{self, ReactionSummaries, ToggleEffect},
    reconcile::{merge_push, PushOutcome},
    store::MessageStore,
    ChatEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollPath {
    Initial,
    Primary,
    Backup,
}

impl PollPath {
    fn as_str(self) -> &'static str {
        match self {
            PollPath::Initial => "initial",
            PollPath::Primary => "primary",
            PollPath::Backup => "backup",
        }
    }
}

pub(crate) struct RoomView {
    topic: Option<RoomTopic>,
    backend: Arc<dyn ChatBackend>,
    settings: SyncSettings,
    store: Mutex<MessageStore>,
    connection: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ChatEvent>,
}

impl RoomView {
    pub(crate) fn new(
        topic: Option<RoomTopic>,
        backend: Arc<dyn ChatBackend>,
        settings: SyncSettings,
        events: broadcast::Sender<ChatEvent>,
    ) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Unknown);
        Self {
            store: Mutex::new(MessageStore::new(topic.clone())),
            topic,
            backend,
            settings,
            connection,
            events,
        }
    }

    pub(crate) fn topic(&self) -> Option<&RoomTopic> {
        self.topic.as_ref()
    }

    pub(crate) fn backend(&self) -> &dyn ChatBackend {
        self.backend.as_ref()
    }

    pub(crate) fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub(crate) fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub(crate) fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub(crate) async fn messages(&self) -> Vec<Message> {
        self.store.lock().await.messages().to_vec()
    }

    /// Returns whether the state changed.
    pub(crate) fn report_status(&self, next: ConnectionState) -> bool {
        let mut applied = None;
        self.connection.send_if_modified(|state| match state.advance(next) {
            Some(advanced) => {
                *state = advanced;
                applied = Some(advanced);
                true
            }
            None => false,
        });

        match applied {
            Some(state) => {
                info!(room = ?self.topic, ?state, "push channel status changed");
                self.emit(ChatEvent::ConnectionChanged {
                    room: self.topic.clone(),
                    state,
                });
                true
            }
            None => {
                debug!(room = ?self.topic, ?next, current = ?self.connection_state(), "ignoring channel status");
                false
            }
        }
    }

    pub(crate) async fn apply_push(&self, message: Message) {
        if message.room != self.topic {
            debug!(room = ?self.topic, message_room = ?message.room, "ignoring push for another room");
            return;
        }

        let mut store = self.store.lock().await;
        let merge = merge_push(store.messages(), message.clone());
        match merge.outcome {
            PushOutcome::Duplicate => {
                debug!(room = ?self.topic, "duplicate push delivery");
                return;
            }
            PushOutcome::Collapsed(local_id) => {
                debug!(room = ?self.topic, %local_id, "push confirmed pending message");
            }
            PushOutcome::Appended => {}
        }
        store.replace_all(merge.messages);
        store.record_arrival(&message);
        drop(store);
        self.emit_messages_changed();
    }

    pub(crate) async fn poll_once(&self, path: PollPath) -> bool {
        let ticket = self.store.lock().await.begin_snapshot();
        let snapshot = match self
            .backend
            .fetch_messages(self.topic.as_ref(), self.settings.fetch_limit)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.store.lock().await.finish_snapshot(ticket);
                warn!(room = ?self.topic, path = path.as_str(), %err, "message fetch failed; skipping tick");
                return false;
            }
        };

        let (changed, confirmed) = {
            let mut store = self.store.lock().await;
            let before = store.messages().to_vec();
            for local_id in store.apply_snapshot(ticket, snapshot) {
                debug!(room = ?self.topic, %local_id, path = path.as_str(), "snapshot confirmed pending message");
            }
            (store.messages() != before.as_slice(), store.confirmed_ids())
        };
        if changed {
            self.emit_messages_changed();
        }

        self.refresh_reactions(&confirmed).await;
        true
    }

    pub(crate) async fn refresh_reactions(&self, ids: &[ServerMessageId]) {
        if ids.is_empty() {
            return;
        }
        let mut fetched = match self.backend.fetch_reactions(ids).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(room = ?self.topic, %err, "reaction fetch failed; keeping local state");
                return;
            }
        };
        for records in fetched.values_mut() {
            reactions::enforce_exclusive(records);
        }
        self.store.lock().await.replace_reactions(ids, fetched);
        self.emit(ChatEvent::ReactionsChanged {
            room: self.topic.clone(),
            message_ids: ids.to_vec(),
        });
    }

    pub(crate) async fn insert_pending(&self, message: Message) {
        self.store.lock().await.push_pending(message);
        self.emit_messages_changed();
    }

    pub(crate) async fn promote(&self, local_id: LocalId, confirmed: Message) {
        let mut store = self.store.lock().await;
        store.record_arrival(&confirmed);
        if !store.promote(local_id, confirmed.clone()) {
            debug!(room = ?self.topic, %local_id, "pending message already reconciled");
            store.insert_confirmed(confirmed);
        }
        drop(store);
        self.emit_messages_changed();
    }

    pub(crate) async fn discard(&self, local_id: LocalId) {
        let removed = self.store.lock().await.discard(local_id);
        if removed.is_some() {
            self.emit_messages_changed();
        }
    }

    pub(crate) async fn apply_local_toggle(
        &self,
        message_id: &ServerMessageId,
        user: &UserId,
        kind: ReactionKind,
    ) -> Result<ToggleEffect, ReactionError> {
        let mut store = self.store.lock().await;
        if !store.contains(&MessageId::Confirmed(message_id.clone())) {
            return Err(ReactionError::UnknownMessage(message_id.clone()));
        }
        let effect = reactions::apply_toggle(
            store.reactions_mut(message_id),
            message_id,
            user,
            kind,
            Utc::now(),
        );
        drop(store);
        self.emit(ChatEvent::ReactionsChanged {
            room: self.topic.clone(),
            message_ids: vec![message_id.clone()],
        });
        Ok(effect)
    }

    pub(crate) async fn sync_reaction(
        &self,
        message_id: ServerMessageId,
        user: UserId,
        kind: ReactionKind,
    ) {
        if let Err(err) = self.backend.toggle_reaction(&message_id, &user, kind).await {
            warn!(room = ?self.topic, %message_id, %err, "reaction toggle rejected");
            self.emit(ChatEvent::Error(format!(
                "failed to update reaction on message {message_id}: {err}"
            )));
        }
        self.refresh_reactions(std::slice::from_ref(&message_id)).await;
    }

    pub(crate) async fn reaction_summary(
        &self,
        message_id: &ServerMessageId,
        viewer: Option<&UserId>,
    ) -> ReactionSummaries {
        let store = self.store.lock().await;
        reactions::summarize(store.reactions(message_id), viewer)
    }

    pub(crate) fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event);
    }

    fn emit_messages_changed(&self) {
        self.emit(ChatEvent::MessagesChanged {
            room: self.topic.clone(),
        });
    }
}
