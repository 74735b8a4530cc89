//! Document operation classifier.

use crate::documents::{DocumentOperation, OperationKind, OrderedDocumentSet};
use crate::types::Document;

/// True when the stored copy carries the same concurrency token, i.e. the
/// incoming document is a redelivery of what is already held.
fn is_unchanged(stored: &Document, incoming: &Document) -> bool {
    incoming.etag.is_some() && stored.etag == incoming.etag
}

/// Classify a document against a set without touching the set.
///
/// Removals carry the previously stored document so callers can report
/// what disappeared.
pub fn classify(document: Document, set: &OrderedDocumentSet) -> DocumentOperation {
    let index = set.find(&document.id);

    if let Some(stored) = index.and_then(|i| set.get(i)) {
        if is_unchanged(stored, &document) {
            return DocumentOperation::new(document, OperationKind::None);
        }
    }

    match (index, document.is_tombstone()) {
        (Some(i), true) => match set.get(i) {
            Some(stored) => DocumentOperation::new(stored.clone(), OperationKind::Remove),
            None => DocumentOperation::new(document, OperationKind::None),
        },
        (None, true) => DocumentOperation::new(document, OperationKind::None),
        (None, false) => DocumentOperation::new(document, OperationKind::Insert),
        (Some(_), false) => DocumentOperation::new(document, OperationKind::Update),
    }
}

/// Classify a document and apply it to the set in place.
///
/// Updates move the stored element only when the new sort position differs
/// from the current one; otherwise it is overwritten where it stands.
pub fn classify_and_apply(document: Document, set: &mut OrderedDocumentSet) -> DocumentOperation {
    let index = set.find(&document.id);

    if let Some(stored) = index.and_then(|i| set.get(i)) {
        if is_unchanged(stored, &document) {
            return DocumentOperation::new(document, OperationKind::None);
        }
    }

    if document.is_tombstone() {
        return match index {
            Some(i) => DocumentOperation::new(set.remove_at(i), OperationKind::Remove),
            None => DocumentOperation::new(document, OperationKind::None),
        };
    }

    // Position is computed while the old version is still in place
    let target = set.position_for(&document);

    match index {
        Some(current) if target == current || target == current + 1 => {
            set.replace_at(current, document.clone());
            DocumentOperation::new(document, OperationKind::Update)
        }
        Some(current) => {
            set.remove_at(current);
            let target = if target > current { target - 1 } else { target };
            set.insert_at(target, document.clone());
            DocumentOperation::new(document, OperationKind::Update)
        }
        None => {
            set.insert_at(target, document.clone());
            DocumentOperation::new(document, OperationKind::Insert)
        }
    }
}
