use super::*;
use crate::test_support::ts;

fn message() -> ServerMessageId {
    ServerMessageId::new("m1")
}

fn record(user: &str, kind: ReactionKind, at: i64) -> Reaction {
    Reaction {
        id: ReactionId::new(format!("r-{user}-{at}")),
        message_id: message(),
        user_id: UserId::new(user),
        kind,
        created_at: ts(at),
    }
}

#[test]
fn reacting_with_another_kind_replaces_previous_reaction() {
    let me = UserId::new("a");
    let mut records = Vec::new();

    apply_toggle(&mut records, &message(), &me, ReactionKind::ThumbsUp, ts(1));
    let effect = apply_toggle(&mut records, &message(), &me, ReactionKind::Heart, ts(2));

    assert_eq!(
        effect,
        ToggleEffect::Replaced {
            from: ReactionKind::ThumbsUp,
            to: ReactionKind::Heart
        }
    );
    let summary = summarize(&records, Some(&me));
    assert_eq!(summary.count(ReactionKind::Heart), 1);
    assert_eq!(summary.count(ReactionKind::ThumbsUp), 0);
    assert!(summary.get(ReactionKind::Heart).current_user_reacted);
}

#[test]
fn toggling_same_kind_twice_restores_previous_state() {
    let me = UserId::new("a");
    let mut records = vec![record("b", ReactionKind::Fire, 0)];
    let before = summarize(&records, Some(&me));

    assert_eq!(
        apply_toggle(&mut records, &message(), &me, ReactionKind::Fire, ts(1)),
        ToggleEffect::Added(ReactionKind::Fire)
    );
    assert_eq!(
        apply_toggle(&mut records, &message(), &me, ReactionKind::Fire, ts(2)),
        ToggleEffect::Removed(ReactionKind::Fire)
    );

    assert_eq!(summarize(&records, Some(&me)), before);
}

#[test]
fn summary_counts_all_users_but_flags_only_viewer() {
    let records = vec![
        record("a", ReactionKind::Laugh, 0),
        record("b", ReactionKind::Laugh, 1),
        record("c", ReactionKind::Sad, 2),
    ];

    let summary = summarize(&records, Some(&UserId::new("c")));

    assert_eq!(
        summary.get(ReactionKind::Laugh),
        ReactionSummary {
            count: 2,
            current_user_reacted: false
        }
    );
    assert!(summary.get(ReactionKind::Sad).current_user_reacted);
    assert_eq!(summary.iter().count(), 2);
}

#[test]
fn anonymous_viewer_never_reacted() {
    let records = vec![record("a", ReactionKind::Heart, 0)];
    let summary = summarize(&records, None);
    assert!(!summary.get(ReactionKind::Heart).current_user_reacted);
}

#[test]
fn toggle_collapses_duplicate_records_for_user() {
    let me = UserId::new("a");
    let mut records = vec![
        record("a", ReactionKind::Heart, 0),
        record("a", ReactionKind::Fire, 1),
    ];

    apply_toggle(&mut records, &message(), &me, ReactionKind::Surprised, ts(2));

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, ReactionKind::Surprised);
}

#[test]
fn exclusivity_keeps_newest_record_per_user() {
    let mut records = vec![
        record("a", ReactionKind::Heart, 5),
        record("b", ReactionKind::Fire, 1),
        record("a", ReactionKind::Laugh, 3),
    ];

    enforce_exclusive(&mut records);

    let kinds: Vec<_> = records.iter().map(|r| (r.user_id.as_str(), r.kind)).collect();
    assert_eq!(
        kinds,
        vec![("a", ReactionKind::Heart), ("b", ReactionKind::Fire)]
    );
}
