//! Batch reconciler.

use super::classify::{classify, classify_and_apply};
use crate::documents::{DocumentOperation, OperationKind, OperationSet, OrderedDocumentSet};
use crate::query::Direction;
use crate::types::Document;
use serde::{Deserialize, Serialize};

/// A server-pushed unit of changes for one subscription.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// Complete replacement dataset (initial push after subscribing).
    #[serde(default)]
    pub snapshot: Option<Vec<Document>>,

    /// Documents changed since the previous batch, in delivery order.
    #[serde(default)]
    pub updates: Vec<Document>,
}

impl Batch {
    pub fn snapshot(documents: Vec<Document>) -> Self {
        Self {
            snapshot: Some(documents),
            updates: Vec::new(),
        }
    }

    pub fn updates(documents: Vec<Document>) -> Self {
        Self {
            snapshot: None,
            updates: documents,
        }
    }

    pub fn with_updates(mut self, documents: Vec<Document>) -> Self {
        self.updates = documents;
        self
    }
}

/// Outcome of applying one batch.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciliation {
    /// The new materialized set.
    pub documents: OrderedDocumentSet,
    pub inserted: Vec<Document>,
    pub updated: Vec<Document>,
    pub removed: Vec<Document>,
    /// True when there was no previous set to diff against.
    pub initial: bool,
}

impl Reconciliation {
    /// True when any change list is non-empty.
    pub fn has_changes(&self) -> bool {
        !(self.inserted.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }

    /// Whether subscribers must hear about this pass. An unchanged refresh
    /// of an existing set stays silent; the first value is always announced.
    pub fn should_notify(&self) -> bool {
        self.initial || self.has_changes()
    }
}

/// Apply a batch to the previous materialized set.
///
/// `directions` are the subscription's ordering clause directions and
/// `cap` its result-size limit. Documents trimmed past the cap are reported
/// as removed.
pub fn reconcile(
    previous: Option<OrderedDocumentSet>,
    batch: Batch,
    directions: &[Direction],
    cap: Option<usize>,
) -> Reconciliation {
    let initial = previous.is_none();
    let mut operations = OperationSet::new();

    let mut working = match (previous, batch.snapshot) {
        (Some(previous), Some(snapshot)) => {
            // Everything held so far is gone unless the snapshot says otherwise
            for document in previous.iter() {
                operations.replace(DocumentOperation::new(
                    document.clone(),
                    OperationKind::Remove,
                ));
            }

            let next = OrderedDocumentSet::from_documents(directions.to_vec(), snapshot);
            for document in next.iter() {
                operations.replace(classify(document.clone(), &previous));
            }
            next
        }
        (Some(previous), None) => previous,
        (None, snapshot) => {
            let next =
                OrderedDocumentSet::from_documents(directions.to_vec(), snapshot.unwrap_or_default());
            for document in next.iter() {
                operations.merge(DocumentOperation::new(
                    document.clone(),
                    OperationKind::Insert,
                ));
            }
            next
        }
    };

    for document in batch.updates {
        operations.merge(classify_and_apply(document, &mut working));
    }

    if let Some(cap) = cap {
        for document in working.truncate(cap) {
            operations.merge(DocumentOperation::new(document, OperationKind::Remove));
        }
    }

    if initial {
        return Reconciliation {
            inserted: working.to_vec(),
            documents: working,
            updated: Vec::new(),
            removed: Vec::new(),
            initial,
        };
    }

    let (inserted, updated, removed) = operations.partition();

    Reconciliation {
        documents: working,
        inserted,
        updated,
        removed,
        initial,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ASC: &[Direction] = &[Direction::Ascending];

    fn doc(id: &str, etag: &str, key: &str) -> Document {
        Document::new("c", id, etag, json!({"v": etag}).as_object().cloned().unwrap())
            .with_sort_keys(vec![key.to_string()], id)
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    fn set_of(docs: Vec<Document>) -> OrderedDocumentSet {
        OrderedDocumentSet::from_documents(ASC.to_vec(), docs)
    }

    #[test]
    fn test_first_batch_reports_everything_inserted() {
        let result = reconcile(
            None,
            Batch::snapshot(vec![doc("b", "1", "2"), doc("a", "1", "1")]),
            ASC,
            None,
        );

        assert!(result.initial);
        assert_eq!(ids(result.documents.as_slice()), vec!["a", "b"]);
        assert_eq!(ids(&result.inserted), vec!["a", "b"]);
        assert!(result.updated.is_empty());
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_empty_first_snapshot_still_notifies() {
        let result = reconcile(None, Batch::snapshot(vec![]), ASC, None);

        assert!(result.documents.is_empty());
        assert!(!result.has_changes());
        assert!(result.should_notify());
    }

    #[test]
    fn test_unchanged_redelivery_is_silent() {
        let previous = set_of(vec![doc("a", "1", "1")]);
        let result = reconcile(
            Some(previous),
            Batch::updates(vec![doc("a", "1", "1")]),
            ASC,
            None,
        );

        assert!(!result.has_changes());
        assert!(!result.should_notify());
        assert_eq!(result.documents.len(), 1);
    }

    #[test]
    fn test_incremental_update() {
        let previous = set_of(vec![doc("a", "1", "1")]);
        let result = reconcile(
            Some(previous),
            Batch::updates(vec![doc("a", "2", "1")]),
            ASC,
            None,
        );

        assert_eq!(ids(&result.updated), vec!["a"]);
        assert_eq!(result.updated[0].etag.as_deref(), Some("2"));
        assert!(result.inserted.is_empty());
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_snapshot_against_previous_set() {
        let previous = set_of(vec![doc("a", "1", "1"), doc("b", "1", "2"), doc("c", "1", "3")]);
        let result = reconcile(
            Some(previous),
            // a unchanged, b changed, c gone, d new
            Batch::snapshot(vec![doc("a", "1", "1"), doc("b", "2", "2"), doc("d", "1", "4")]),
            ASC,
            None,
        );

        assert_eq!(ids(result.documents.as_slice()), vec!["a", "b", "d"]);
        assert_eq!(ids(&result.inserted), vec!["d"]);
        assert_eq!(ids(&result.updated), vec!["b"]);
        assert_eq!(ids(&result.removed), vec!["c"]);
    }

    #[test]
    fn test_snapshot_then_updates_in_same_batch() {
        let previous = set_of(vec![doc("a", "1", "1"), doc("b", "1", "2")]);
        let batch = Batch::snapshot(vec![doc("a", "1", "1"), doc("b", "1", "2")])
            .with_updates(vec![doc("c", "1", "3"), Document::removed("c", "c"), Document::removed("c", "a")]);

        let result = reconcile(Some(previous), batch, ASC, None);

        // c was added and removed within the batch: nothing to report
        assert!(result.inserted.is_empty());
        assert!(result.updated.is_empty());
        assert_eq!(ids(&result.removed), vec!["a"]);
        assert_eq!(ids(result.documents.as_slice()), vec!["b"]);
    }

    #[test]
    fn test_cap_trims_tail_as_removed() {
        let previous = set_of(vec![doc("a", "1", "1"), doc("c", "1", "3")]);
        let result = reconcile(
            Some(previous),
            Batch::updates(vec![doc("b", "1", "2")]),
            ASC,
            Some(2),
        );

        assert_eq!(ids(result.documents.as_slice()), vec!["a", "b"]);
        assert_eq!(ids(&result.inserted), vec!["b"]);
        assert_eq!(ids(&result.removed), vec!["c"]);
    }

    #[test]
    fn test_cap_cancels_insert_past_limit() {
        let previous = set_of(vec![doc("a", "1", "1"), doc("b", "1", "2")]);
        let result = reconcile(
            Some(previous),
            Batch::updates(vec![doc("z", "1", "9")]),
            ASC,
            Some(2),
        );

        assert_eq!(result.documents.len(), 2);
        assert!(!result.has_changes());
    }

    #[test]
    fn test_cap_on_initial_batch() {
        let result = reconcile(
            None,
            Batch::snapshot(vec![doc("a", "1", "1"), doc("b", "1", "2"), doc("c", "1", "3")]),
            ASC,
            Some(2),
        );

        assert_eq!(ids(&result.inserted), vec!["a", "b"]);
        assert!(result.removed.is_empty());
    }

    #[test]
    fn test_snapshot_tombstones_are_ignored() {
        let previous = set_of(vec![doc("a", "1", "1")]);
        let result = reconcile(
            Some(previous),
            Batch::snapshot(vec![doc("a", "1", "1"), Document::removed("c", "x")]),
            ASC,
            None,
        );

        assert!(!result.has_changes());
        assert_eq!(result.documents.len(), 1);
    }
}
