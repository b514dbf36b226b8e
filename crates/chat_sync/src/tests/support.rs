//! In-memory `ChatBackend` used by the unit tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use shared::domain::{
    ConnectionState, Identity, Message, MessageId, Reaction, ReactionKind, RoomTopic,
    ServerMessageId, UserId,
};
use tokio::sync::{mpsc, Notify};

use crate::{
    backend::{ChatBackend, PushEvent, PushSubscription},
    config::SyncSettings,
    reactions,
};

pub(crate) fn ts(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_767_225_600 + seconds, 0)
        .single()
        .expect("valid timestamp")
}

pub(crate) fn confirmed(id: &str, sender: &str, body: &str) -> Message {
    confirmed_in(None, id, sender, body)
}

pub(crate) fn confirmed_in(room: Option<&str>, id: &str, sender: &str, body: &str) -> Message {
    Message {
        id: MessageId::confirmed(id),
        room: room.map(RoomTopic::new),
        sender_display_name: sender.into(),
        body: body.into(),
        created_at: ts(id.parse().unwrap_or(0)),
    }
}

pub(crate) fn pending(local: u64, sender: &str, body: &str) -> Message {
    Message {
        id: MessageId::Pending(shared::domain::LocalId(local)),
        room: None,
        sender_display_name: sender.into(),
        body: body.into(),
        created_at: ts(10_000 + local as i64),
    }
}

pub(crate) fn ids(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.id.to_string()).collect()
}

pub(crate) fn alice() -> Identity {
    Identity::new("user-a", "A")
}

pub(crate) fn test_settings() -> SyncSettings {
    SyncSettings {
        server_url: "http://127.0.0.1:0".into(),
        primary_poll_interval: Duration::from_secs(3),
        backup_poll_interval: Duration::from_secs(5),
        subscribe_timeout: Duration::from_secs(10),
        fetch_limit: 50,
    }
}

/// Lets spawned tasks run without moving the paused clock.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct FakeState {
    messages: HashMap<Option<RoomTopic>, Vec<Message>>,
    reactions: HashMap<ServerMessageId, Vec<Reaction>>,
    next_id: u64,
    fetch_calls: HashMap<Option<RoomTopic>, usize>,
    send_calls: usize,
    toggle_calls: usize,
    subscribers: Vec<(Option<RoomTopic>, mpsc::Sender<PushEvent>)>,
    fail_fetch: bool,
    fail_send: bool,
    fail_subscribe: bool,
    fail_toggle: bool,
    auto_ack: bool,
    send_gate: Option<Arc<Notify>>,
    fetch_gates: HashMap<Option<RoomTopic>, Arc<Notify>>,
    toggle_gate: Option<Arc<Notify>>,
}

pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_id: 100,
                ..FakeState::default()
            }),
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().expect("fake backend state");
        f(&mut state)
    }

    pub(crate) fn seed(&self, message: Message) {
        self.with_state(|state| {
            state
                .messages
                .entry(message.room.clone())
                .or_default()
                .push(message);
        });
    }

    pub(crate) fn seed_reaction(&self, message_id: &str, user: &str, kind: ReactionKind) {
        self.with_state(|state| {
            let id = ServerMessageId::new(message_id);
            let records = state.reactions.entry(id.clone()).or_default();
            reactions::apply_toggle(records, &id, &UserId::new(user), kind, Utc::now());
        });
    }

    pub(crate) fn set_next_id(&self, next: u64) {
        self.with_state(|state| state.next_id = next);
    }

    pub(crate) fn set_fail_fetch(&self, fail: bool) {
        self.with_state(|state| state.fail_fetch = fail);
    }

    pub(crate) fn set_fail_send(&self, fail: bool) {
        self.with_state(|state| state.fail_send = fail);
    }

    pub(crate) fn set_fail_subscribe(&self, fail: bool) {
        self.with_state(|state| state.fail_subscribe = fail);
    }

    pub(crate) fn set_fail_toggle(&self, fail: bool) {
        self.with_state(|state| state.fail_toggle = fail);
    }

    pub(crate) fn set_auto_ack(&self, ack: bool) {
        self.with_state(|state| state.auto_ack = ack);
    }

    /// Holds every send until the returned handle is notified once per send.
    pub(crate) fn hold_sends(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.with_state(|state| state.send_gate = Some(Arc::clone(&gate)));
        gate
    }

    /// Holds every message fetch for `room` after its snapshot is taken,
    /// until the returned handle is notified once per fetch.
    pub(crate) fn hold_fetches(&self, room: Option<&str>) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        let room = room.map(RoomTopic::new);
        self.with_state(|state| state.fetch_gates.insert(room, Arc::clone(&gate)));
        gate
    }

    /// Holds every reaction toggle until the returned handle is notified once
    /// per toggle.
    pub(crate) fn hold_toggles(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.with_state(|state| state.toggle_gate = Some(Arc::clone(&gate)));
        gate
    }

    pub(crate) fn fetch_count(&self, room: Option<&str>) -> usize {
        let room = room.map(RoomTopic::new);
        self.with_state(|state| state.fetch_calls.get(&room).copied().unwrap_or(0))
    }

    pub(crate) fn send_count(&self) -> usize {
        self.with_state(|state| state.send_calls)
    }

    pub(crate) fn toggle_count(&self) -> usize {
        self.with_state(|state| state.toggle_calls)
    }

    /// Subscriptions for `room` whose receiving side is still alive.
    pub(crate) fn open_subscriptions(&self, room: Option<&str>) -> usize {
        let room = room.map(RoomTopic::new);
        self.with_state(|state| {
            state
                .subscribers
                .iter()
                .filter(|(topic, tx)| *topic == room && !tx.is_closed())
                .count()
        })
    }

    pub(crate) fn push(&self, room: Option<&str>, event: PushEvent) {
        let room = room.map(RoomTopic::new);
        self.with_state(|state| {
            for (topic, tx) in &state.subscribers {
                if *topic == room {
                    let _ = tx.try_send(event.clone());
                }
            }
        });
    }

    pub(crate) fn push_status(&self, room: Option<&str>, status: ConnectionState) {
        self.push(room, PushEvent::Status(status));
    }

    /// Drops the sending side of every subscription for `room`.
    pub(crate) fn close_push(&self, room: Option<&str>) {
        let room = room.map(RoomTopic::new);
        self.with_state(|state| state.subscribers.retain(|(topic, _)| *topic != room));
    }

    pub(crate) fn server_reactions(&self, message_id: &str) -> Vec<Reaction> {
        self.with_state(|state| {
            state
                .reactions
                .get(&ServerMessageId::new(message_id))
                .cloned()
                .unwrap_or_default()
        })
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn fetch_messages(&self, room: Option<&RoomTopic>, limit: u32) -> Result<Vec<Message>> {
        let (snapshot, gate) = self.with_state(|state| {
            *state.fetch_calls.entry(room.cloned()).or_default() += 1;
            let gate = state.fetch_gates.get(&room.cloned()).cloned();
            if state.fail_fetch {
                return (Err(anyhow!("fetch unavailable")), gate);
            }
            let all = state.messages.get(&room.cloned()).cloned().unwrap_or_default();
            let skip = all.len().saturating_sub(limit as usize);
            (Ok(all.into_iter().skip(skip).collect()), gate)
        });
        if let Some(gate) = gate {
            gate.notified().await;
        }
        snapshot
    }

    async fn subscribe(&self, room: Option<&RoomTopic>) -> Result<PushSubscription> {
        self.with_state(|state| {
            if state.fail_subscribe {
                return Err(anyhow!("realtime unavailable"));
            }
            let (tx, rx) = mpsc::channel(64);
            if state.auto_ack {
                let _ = tx.try_send(PushEvent::Status(ConnectionState::Subscribed));
            }
            state.subscribers.push((room.cloned(), tx));
            Ok(PushSubscription::from_channel(rx))
        })
    }

    async fn send_message(
        &self,
        sender_display_name: &str,
        body: &str,
        room: Option<&RoomTopic>,
    ) -> Result<Message> {
        let gate = self.with_state(|state| {
            state.send_calls += 1;
            state.send_gate.clone()
        });
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.with_state(|state| {
            if state.fail_send {
                return Err(anyhow!("send rejected"));
            }
            let id = state.next_id;
            state.next_id += 1;
            let message = Message {
                id: MessageId::confirmed(id.to_string()),
                room: room.cloned(),
                sender_display_name: sender_display_name.into(),
                body: body.into(),
                created_at: ts(id as i64),
            };
            state
                .messages
                .entry(room.cloned())
                .or_default()
                .push(message.clone());
            Ok(message)
        })
    }

    async fn fetch_reactions(
        &self,
        message_ids: &[ServerMessageId],
    ) -> Result<HashMap<ServerMessageId, Vec<Reaction>>> {
        self.with_state(|state| {
            if state.fail_fetch {
                return Err(anyhow!("fetch unavailable"));
            }
            Ok(message_ids
                .iter()
                .filter_map(|id| {
                    state
                        .reactions
                        .get(id)
                        .map(|records| (id.clone(), records.clone()))
                })
                .collect())
        })
    }

    async fn toggle_reaction(
        &self,
        message_id: &ServerMessageId,
        user_id: &UserId,
        kind: ReactionKind,
    ) -> Result<()> {
        let gate = self.with_state(|state| {
            state.toggle_calls += 1;
            state.toggle_gate.clone()
        });
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.with_state(|state| {
            if state.fail_toggle {
                return Err(anyhow!("toggle rejected"));
            }
            let records = state.reactions.entry(message_id.clone()).or_default();
            reactions::apply_toggle(records, message_id, user_id, kind, Utc::now());
            Ok(())
        })
    }
}
