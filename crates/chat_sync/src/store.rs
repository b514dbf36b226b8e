use std::collections::{HashMap, HashSet};

use shared::domain::{LocalId, Message, MessageId, Reaction, RoomTopic, ServerMessageId};

use crate::reconcile::merge_snapshot;

/// Confirmed messages first, in backend order, then pending messages in send
/// order.
#[derive(Debug, Default)]
pub struct MessageStore {
    room: Option<RoomTopic>,
    messages: Vec<Message>,
    reactions: HashMap<ServerMessageId, Vec<Reaction>>,
    snapshots_in_flight: usize,
    arrival_seq: u64,
    arrivals: Vec<(u64, Message)>,
}

/// Marks the point a snapshot fetch was issued at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotTicket(u64);

impl MessageStore {
    pub fn new(room: Option<RoomTopic>) -> Self {
        Self {
            room,
            ..Self::default()
        }
    }

    pub fn room(&self) -> Option<&RoomTopic> {
        self.room.as_ref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.position(id).map(|index| &self.messages[index])
    }

    pub fn pending_count(&self) -> usize {
        self.messages.len() - self.confirmed_len()
    }

    pub fn confirmed_ids(&self) -> Vec<ServerMessageId> {
        self.messages
            .iter()
            .filter_map(|message| message.id.as_confirmed().cloned())
            .collect()
    }

    pub fn push_pending(&mut self, message: Message) {
        debug_assert!(message.is_pending());
        self.messages.push(message);
    }

    /// Inserts a confirmed message at the confirmed/pending boundary.
    /// Returns `false` when a message with the same id is already held.
    pub fn insert_confirmed(&mut self, message: Message) -> bool {
        debug_assert!(!message.is_pending());
        if self.contains(&message.id) {
            return false;
        }
        let boundary = self.confirmed_len();
        self.messages.insert(boundary, message);
        true
    }

    /// Returns `false` if `local_id` is no longer held.
    pub fn promote(&mut self, local_id: LocalId, confirmed: Message) -> bool {
        if self.discard(local_id).is_none() {
            return false;
        }
        self.insert_confirmed(confirmed);
        true
    }

    pub fn discard(&mut self, local_id: LocalId) -> Option<Message> {
        let index = self.position(&MessageId::Pending(local_id))?;
        Some(self.messages.remove(index))
    }

    pub fn replace_all(&mut self, messages: Vec<Message>) {
        debug_assert!(is_partitioned(&messages));
        self.messages = messages;
        let held: HashSet<&ServerMessageId> = self
            .messages
            .iter()
            .filter_map(|message| message.id.as_confirmed())
            .collect();
        self.reactions.retain(|id, _| held.contains(id));
    }

    pub fn begin_snapshot(&mut self) -> SnapshotTicket {
        self.snapshots_in_flight += 1;
        SnapshotTicket(self.arrival_seq)
    }

    /// Notes a confirmed message that reached the list through push or send
    /// while a snapshot fetch may be outstanding.
    pub fn record_arrival(&mut self, message: &Message) {
        if self.snapshots_in_flight == 0 {
            return;
        }
        self.arrival_seq += 1;
        self.arrivals.push((self.arrival_seq, message.clone()));
    }

    /// Merges a snapshot fetched under `ticket`. Confirmed messages that
    /// arrived after the fetch was issued stay even if the snapshot predates
    /// them. Returns the pending entries the snapshot superseded.
    pub fn apply_snapshot(
        &mut self,
        ticket: SnapshotTicket,
        snapshot: Vec<Message>,
    ) -> Vec<LocalId> {
        let merge = merge_snapshot(&self.messages, snapshot);
        let late: Vec<Message> = self
            .arrivals
            .iter()
            .filter(|(seq, _)| *seq > ticket.0)
            .map(|(_, message)| message.clone())
            .collect();
        self.finish_snapshot(ticket);

        self.replace_all(merge.messages);
        for message in late {
            self.insert_confirmed(message);
        }
        merge.collapsed
    }

    /// Releases `ticket` without merging, e.g. after a failed fetch.
    pub fn finish_snapshot(&mut self, _ticket: SnapshotTicket) {
        self.snapshots_in_flight = self.snapshots_in_flight.saturating_sub(1);
        if self.snapshots_in_flight == 0 {
            self.arrivals.clear();
        }
    }

    pub fn reactions(&self, id: &ServerMessageId) -> &[Reaction] {
        self.reactions.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn reactions_mut(&mut self, id: &ServerMessageId) -> &mut Vec<Reaction> {
        self.reactions.entry(id.clone()).or_default()
    }

    /// Accepts an authoritative reaction fetch for `queried` ids. Ids that
    /// were queried but are missing from `fetched` have no reactions left.
    pub fn replace_reactions(
        &mut self,
        queried: &[ServerMessageId],
        mut fetched: HashMap<ServerMessageId, Vec<Reaction>>,
    ) {
        for id in queried {
            if !self.contains(&MessageId::Confirmed(id.clone())) {
                continue;
            }
            match fetched.remove(id) {
                Some(records) if !records.is_empty() => {
                    self.reactions.insert(id.clone(), records);
                }
                _ => {
                    self.reactions.remove(id);
                }
            }
        }
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|message| &message.id == id)
    }

    fn confirmed_len(&self) -> usize {
        self.messages
            .iter()
            .position(Message::is_pending)
            .unwrap_or(self.messages.len())
    }
}

/// Whether every confirmed message precedes every pending one.
pub fn is_partitioned(messages: &[Message]) -> bool {
    let first_pending = messages
        .iter()
        .position(Message::is_pending)
        .unwrap_or(messages.len());
    messages[first_pending..].iter().all(Message::is_pending)
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
