//! Property tests for the ordered set and the batch reconciler.

use docsync::{
    classify, classify_and_apply, reconcile, Batch, Direction, Document, OperationKind,
    OrderedDocumentSet,
};
use proptest::prelude::*;
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// An incoming change: a live document or a tombstone.
#[derive(Clone, Debug)]
enum Change {
    Upsert { id: u8, etag: u8, key: u8 },
    Remove { id: u8 },
}

fn arbitrary_change() -> impl Strategy<Value = Change> {
    prop_oneof![
        3 => (0u8..20, 0u8..4, 0u8..10).prop_map(|(id, etag, key)| Change::Upsert { id, etag, key }),
        1 => (0u8..20).prop_map(|id| Change::Remove { id }),
    ]
}

fn arbitrary_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Ascending), Just(Direction::Descending)]
}

fn to_document(change: &Change) -> Document {
    match change {
        Change::Upsert { id, etag, key } => Document::new(
            "items",
            format!("d{}", id),
            etag.to_string(),
            json!({"key": key}).as_object().cloned().unwrap(),
        )
        .with_sort_keys(vec![key.to_string()], format!("{:03}", id)),
        Change::Remove { id } => Document::removed("items", format!("d{}", id)),
    }
}

/// A change for multi-clause queries: every clause gets its own key drawn
/// from a small range so clause ties are common.
#[derive(Clone, Debug)]
enum KeyedChange {
    Upsert { id: u8, etag: u8, keys: [u8; 3] },
    Remove { id: u8 },
}

fn arbitrary_keyed_change() -> impl Strategy<Value = KeyedChange> {
    prop_oneof![
        3 => (0u8..16, 0u8..4, prop::array::uniform3(0u8..3))
            .prop_map(|(id, etag, keys)| KeyedChange::Upsert { id, etag, keys }),
        1 => (0u8..16).prop_map(|id| KeyedChange::Remove { id }),
    ]
}

fn arbitrary_directions() -> impl Strategy<Value = Vec<Direction>> {
    prop::collection::vec(arbitrary_direction(), 2..=3)
}

/// Build the document with exactly one sort key per clause.
fn to_keyed_document(change: &KeyedChange, clauses: usize) -> Document {
    match change {
        KeyedChange::Upsert { id, etag, keys } => Document::new(
            "items",
            format!("d{}", id),
            etag.to_string(),
            json!({"keys": keys.to_vec()}).as_object().cloned().unwrap(),
        )
        .with_sort_keys(
            keys[..clauses].iter().map(|k| k.to_string()).collect(),
            format!("{:03}", id),
        ),
        KeyedChange::Remove { id } => Document::removed("items", format!("d{}", id)),
    }
}

fn etags(set: &OrderedDocumentSet) -> HashMap<String, Option<String>> {
    set.iter().map(|d| (d.id.clone(), d.etag.clone())).collect()
}

fn id_set(documents: &[Document]) -> HashSet<String> {
    documents.iter().map(|d| d.id.clone()).collect()
}

proptest! {
    /// Property: the set stays sorted and duplicate-free under any sequence
    /// of inserts, updates and removals.
    #[test]
    fn prop_set_stays_ordered(
        direction in arbitrary_direction(),
        changes in prop::collection::vec(arbitrary_change(), 1..80),
    ) {
        let mut set = OrderedDocumentSet::new(vec![direction]);

        for change in &changes {
            classify_and_apply(to_document(change), &mut set);
            prop_assert!(set.is_ordered(), "set out of order after {:?}", change);

            let unique: HashSet<&str> = set.iter().map(|d| d.id.as_str()).collect();
            prop_assert_eq!(unique.len(), set.len());
        }
    }

    /// Property: redelivering a held document is always a no-op.
    #[test]
    fn prop_redelivery_is_idempotent(
        changes in prop::collection::vec(arbitrary_change(), 1..40),
    ) {
        let mut set = OrderedDocumentSet::new(vec![Direction::Ascending]);
        for change in &changes {
            classify_and_apply(to_document(change), &mut set);
        }

        for held in set.to_vec() {
            prop_assert_eq!(classify(held, &set).kind, OperationKind::None);
        }
    }

    /// Property: the reconciled set never exceeds the cap, and whatever the
    /// cap pushed out of a previous set is reported as removed.
    #[test]
    fn prop_cap_enforced(
        cap in 1usize..8,
        initial in prop::collection::vec(arbitrary_change(), 0..20),
        updates in prop::collection::vec(arbitrary_change(), 1..20),
    ) {
        let directions = [Direction::Ascending];
        let first = reconcile(
            None,
            Batch::snapshot(initial.iter().map(to_document).collect()),
            &directions,
            Some(cap),
        );
        prop_assert!(first.documents.len() <= cap);

        let before: HashSet<String> = first.documents.iter().map(|d| d.id.clone()).collect();
        let result = reconcile(
            Some(first.documents),
            Batch::updates(updates.iter().map(to_document).collect()),
            &directions,
            Some(cap),
        );

        prop_assert!(result.documents.len() <= cap);
        prop_assert!(result.documents.is_ordered());

        let after: HashSet<String> = result.documents.iter().map(|d| d.id.clone()).collect();
        let removed: HashSet<String> = result.removed.iter().map(|d| d.id.clone()).collect();
        for gone in before.difference(&after) {
            prop_assert!(removed.contains(gone), "{} vanished without a removal", gone);
        }
    }

    /// Property: with several clauses in mixed directions the set stays
    /// sorted and duplicate-free under any sequence of changes.
    #[test]
    fn prop_multi_clause_set_stays_ordered(
        directions in arbitrary_directions(),
        changes in prop::collection::vec(arbitrary_keyed_change(), 1..80),
    ) {
        let clauses = directions.len();
        let mut set = OrderedDocumentSet::new(directions);

        for change in &changes {
            classify_and_apply(to_keyed_document(change, clauses), &mut set);
            prop_assert!(set.is_ordered(), "set out of order after {:?}", change);

            let unique: HashSet<&str> = set.iter().map(|d| d.id.as_str()).collect();
            prop_assert_eq!(unique.len(), set.len());
        }
    }

    /// Property: across snapshots, updates, tombstones and cap trims with
    /// multi-clause ordering, the reconciled set stays sorted and within the
    /// cap, inserted and removed are exactly the identity set difference, and
    /// every surviving document whose etag changed is reported as updated.
    #[test]
    fn prop_multi_clause_reconcile_is_exact(
        directions in arbitrary_directions(),
        cap in prop::option::of(1usize..10),
        initial in prop::collection::vec(arbitrary_keyed_change(), 0..20),
        batches in prop::collection::vec(
            (any::<bool>(), prop::collection::vec(arbitrary_keyed_change(), 0..12)),
            1..5,
        ),
    ) {
        let clauses = directions.len();
        let documents = |changes: &[KeyedChange]| -> Vec<Document> {
            changes.iter().map(|c| to_keyed_document(c, clauses)).collect()
        };

        let first = reconcile(None, Batch::snapshot(documents(&initial)), &directions, cap);
        prop_assert!(first.documents.is_ordered());
        prop_assert_eq!(id_set(&first.inserted), id_set(first.documents.as_slice()));

        let mut current = first.documents;
        for (is_snapshot, changes) in &batches {
            let batch = if *is_snapshot {
                Batch::snapshot(documents(changes))
            } else {
                Batch::updates(documents(changes))
            };

            let before = etags(&current);
            let result = reconcile(Some(current), batch, &directions, cap);
            let after = etags(&result.documents);

            prop_assert!(result.documents.is_ordered(), "out of order after {:?}", changes);
            prop_assert_eq!(after.len(), result.documents.len());
            if let Some(cap) = cap {
                prop_assert!(result.documents.len() <= cap);
            }

            let before_ids: HashSet<String> = before.keys().cloned().collect();
            let after_ids: HashSet<String> = after.keys().cloned().collect();

            let inserted = id_set(&result.inserted);
            let removed = id_set(&result.removed);
            let updated = id_set(&result.updated);
            prop_assert_eq!(inserted.len(), result.inserted.len());
            prop_assert_eq!(removed.len(), result.removed.len());
            prop_assert_eq!(&inserted, &(&after_ids - &before_ids));
            prop_assert_eq!(&removed, &(&before_ids - &after_ids));

            for (id, etag) in &after {
                if let Some(old) = before.get(id) {
                    if old != etag {
                        prop_assert!(updated.contains(id), "{} changed etag but was not reported", id);
                    }
                }
            }
            for id in &updated {
                prop_assert!(before_ids.contains(id) && after_ids.contains(id));
            }

            current = result.documents;
        }
    }
}
