use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use shared::domain::{Reaction, ReactionId, ReactionKind, ServerMessageId, UserId};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionSummary {
    pub count: usize,
    pub current_user_reacted: bool,
}

/// Summary of one message's reactions, keyed by kind. Kinds nobody used read
/// as a zero summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionSummaries(BTreeMap<ReactionKind, ReactionSummary>);

impl ReactionSummaries {
    pub fn get(&self, kind: ReactionKind) -> ReactionSummary {
        self.0.get(&kind).copied().unwrap_or_default()
    }

    pub fn count(&self, kind: ReactionKind) -> usize {
        self.get(kind).count
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReactionKind, ReactionSummary)> + '_ {
        self.0.iter().map(|(kind, summary)| (*kind, *summary))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn summarize(records: &[Reaction], viewer: Option<&UserId>) -> ReactionSummaries {
    let mut by_kind: BTreeMap<ReactionKind, ReactionSummary> = BTreeMap::new();
    for record in records {
        let entry = by_kind.entry(record.kind).or_default();
        entry.count += 1;
        if viewer == Some(&record.user_id) {
            entry.current_user_reacted = true;
        }
    }
    ReactionSummaries(by_kind)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleEffect {
    Added(ReactionKind),
    Replaced {
        from: ReactionKind,
        to: ReactionKind,
    },
    Removed(ReactionKind),
}

/// Applies the toggle rule for `user` on one message's records: same kind
/// removes, another kind replaces, none adds. At most one record per user
/// survives, even if `records` arrived with duplicates.
pub fn apply_toggle(
    records: &mut Vec<Reaction>,
    message_id: &ServerMessageId,
    user: &UserId,
    kind: ReactionKind,
    now: DateTime<Utc>,
) -> ToggleEffect {
    let previous = records
        .iter()
        .find(|record| &record.user_id == user)
        .map(|record| record.kind);
    records.retain(|record| &record.user_id != user);

    match previous {
        Some(existing) if existing == kind => ToggleEffect::Removed(kind),
        previous => {
            records.push(Reaction {
                id: ReactionId(format!("local-{}", Uuid::new_v4())),
                message_id: message_id.clone(),
                user_id: user.clone(),
                kind,
                created_at: now,
            });
            match previous {
                Some(from) => ToggleEffect::Replaced { from, to: kind },
                None => ToggleEffect::Added(kind),
            }
        }
    }
}

/// Keeps only the newest record per user.
pub fn enforce_exclusive(records: &mut Vec<Reaction>) {
    let mut newest: BTreeMap<UserId, (DateTime<Utc>, usize)> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        let candidate = (record.created_at, index);
        newest
            .entry(record.user_id.clone())
            .and_modify(|kept| {
                if candidate >= *kept {
                    *kept = candidate;
                }
            })
            .or_insert(candidate);
    }
    let mut index = 0;
    records.retain(|record| {
        let keep = newest
            .get(&record.user_id)
            .is_some_and(|(_, kept)| *kept == index);
        index += 1;
        keep
    });
}

#[cfg(test)]
#[path = "tests/reactions_tests.rs"]
mod tests;
