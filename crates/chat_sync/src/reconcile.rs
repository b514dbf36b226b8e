use std::collections::HashSet;

use shared::domain::{LocalId, Message, MessageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Duplicate,
    Appended,
    /// Appended after removing the pending placeholder it confirms.
    Collapsed(LocalId),
}

#[derive(Debug)]
pub struct PushMerge {
    pub messages: Vec<Message>,
    pub outcome: PushOutcome,
}

#[derive(Debug)]
pub struct SnapshotMerge {
    pub messages: Vec<Message>,
    /// Pending entries superseded by a confirmed message in the snapshot.
    pub collapsed: Vec<LocalId>,
}

/// A repeated id is a no-op. Otherwise the oldest pending entry with the same
/// sender and body is dropped in favour of the confirmed message.
pub fn merge_push(current: &[Message], incoming: Message) -> PushMerge {
    debug_assert!(!incoming.is_pending());

    if current.iter().any(|message| message.id == incoming.id) {
        return PushMerge {
            messages: current.to_vec(),
            outcome: PushOutcome::Duplicate,
        };
    }

    let collapsed = current
        .iter()
        .find(|message| message.is_pending() && message.same_content(&incoming))
        .and_then(|message| message.id.as_pending());

    let mut confirmed = Vec::with_capacity(current.len() + 1);
    let mut pending = Vec::new();
    for message in current {
        if message.is_pending() {
            if collapsed.is_some() && message.id.as_pending() == collapsed {
                continue;
            }
            pending.push(message.clone());
        } else {
            confirmed.push(message.clone());
        }
    }
    confirmed.push(incoming);
    confirmed.extend(pending);

    PushMerge {
        messages: confirmed,
        outcome: match collapsed {
            Some(local_id) => PushOutcome::Collapsed(local_id),
            None => PushOutcome::Appended,
        },
    }
}

/// Snapshot order, then the pending entries no newly seen snapshot message
/// supersedes. Each new message supersedes at most one pending entry.
pub fn merge_snapshot(current: &[Message], snapshot: Vec<Message>) -> SnapshotMerge {
    let known: HashSet<&MessageId> = current
        .iter()
        .filter(|message| !message.is_pending())
        .map(|message| &message.id)
        .collect();

    let mut seen = HashSet::new();
    let mut confirmed = Vec::with_capacity(snapshot.len());
    for message in snapshot {
        if message.is_pending() || !seen.insert(message.id.clone()) {
            continue;
        }
        confirmed.push(message);
    }

    let mut pending: Vec<&Message> = current.iter().filter(|m| m.is_pending()).collect();
    let mut collapsed = Vec::new();
    for message in confirmed.iter().filter(|m| !known.contains(&m.id)) {
        if let Some(index) = pending.iter().position(|p| p.same_content(message)) {
            if let Some(local_id) = pending.remove(index).id.as_pending() {
                collapsed.push(local_id);
            }
        }
    }

    let mut messages = confirmed;
    messages.extend(pending.into_iter().cloned());
    SnapshotMerge {
        messages,
        collapsed,
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
