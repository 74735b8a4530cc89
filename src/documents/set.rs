//! Ordered document set.

use crate::query::Direction;
use crate::types::Document;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::trace;

fn directed(direction: Direction, ordering: Ordering) -> Ordering {
    match direction {
        Direction::Ascending => ordering,
        Direction::Descending => ordering.reverse(),
    }
}

/// Compare two documents by their sort keys under the given clause
/// directions, falling back to the creation-order key.
///
/// The creation-order tiebreak follows the direction of the first clause
/// (ascending when there are no clauses). Clauses a document has no key for
/// are skipped, which can make the order non-transitive; the server is
/// expected to send one key per clause.
pub fn compare_documents(a: &Document, b: &Document, directions: &[Direction]) -> Ordering {
    if a.sort_keys.len() < directions.len() || b.sort_keys.len() < directions.len() {
        trace!(
            left = %a.id,
            left_keys = a.sort_keys.len(),
            right = %b.id,
            right_keys = b.sort_keys.len(),
            clauses = directions.len(),
            "missing sort keys, skipping clauses"
        );
    }

    for (i, direction) in directions.iter().enumerate() {
        let (Some(ka), Some(kb)) = (a.sort_keys.get(i), b.sort_keys.get(i)) else {
            continue;
        };
        match ka.cmp(kb) {
            Ordering::Equal => continue,
            other => return directed(*direction, other),
        }
    }

    let tiebreak = directions.first().copied().unwrap_or(Direction::Ascending);
    directed(tiebreak, a.sort_value.cmp(&b.sort_value))
}

/// Documents unique by identity, kept sorted by the query comparator.
///
/// Insertion and removal locate their slot by binary search and shift the
/// tail, so a set never needs re-sorting once built.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderedDocumentSet {
    directions: Vec<Direction>,
    documents: Vec<Document>,
}

impl OrderedDocumentSet {
    /// Create an empty set ordered by the given clause directions.
    pub fn new(directions: Vec<Direction>) -> Self {
        Self {
            directions,
            documents: Vec::new(),
        }
    }

    /// Build a set from an arbitrary list, e.g. a full snapshot or a cached
    /// dataset. Tombstones and repeated identities are dropped.
    pub fn from_documents(directions: Vec<Direction>, documents: Vec<Document>) -> Self {
        let mut seen = HashSet::new();
        let mut documents: Vec<Document> = documents
            .into_iter()
            .filter(|d| !d.is_tombstone() && seen.insert(d.id.clone()))
            .collect();
        // Server snapshots arrive sorted already, which makes this a linear pass.
        documents.sort_by(|a, b| compare_documents(a, b, &directions));

        Self {
            directions,
            documents,
        }
    }

    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Document> {
        self.documents.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn as_slice(&self) -> &[Document] {
        &self.documents
    }

    pub fn to_vec(&self) -> Vec<Document> {
        self.documents.clone()
    }

    pub fn into_vec(self) -> Vec<Document> {
        self.documents
    }

    /// Index of the document with the given identity.
    pub fn find(&self, id: &str) -> Option<usize> {
        self.documents.iter().position(|d| d.id == id)
    }

    /// Slot the document belongs in: before the first element that does not
    /// sort strictly before it.
    pub fn position_for(&self, document: &Document) -> usize {
        self.documents
            .partition_point(|e| compare_documents(e, document, &self.directions) == Ordering::Less)
    }

    /// Insert a document at its sorted position and return that position.
    ///
    /// The caller guarantees the identity is not already present.
    pub fn insert(&mut self, document: Document) -> usize {
        let index = self.position_for(&document);
        self.documents.insert(index, document);
        index
    }

    /// Place a document at a precomputed slot.
    pub(crate) fn insert_at(&mut self, index: usize, document: Document) {
        self.documents.insert(index, document);
    }

    pub fn remove_at(&mut self, index: usize) -> Document {
        self.documents.remove(index)
    }

    /// Overwrite the element at `index`, returning the previous one. The
    /// caller guarantees the new document sorts into the same slot.
    pub fn replace_at(&mut self, index: usize, document: Document) -> Document {
        std::mem::replace(&mut self.documents[index], document)
    }

    /// Keep the first `cap` documents and return the rest, in order.
    pub fn truncate(&mut self, cap: usize) -> Vec<Document> {
        if self.documents.len() <= cap {
            return Vec::new();
        }
        self.documents.split_off(cap)
    }

    /// True when every adjacent pair is in comparator order.
    pub fn is_ordered(&self) -> bool {
        self.documents
            .windows(2)
            .all(|w| compare_documents(&w[0], &w[1], &self.directions) != Ordering::Greater)
    }
}
