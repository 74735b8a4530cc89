//! Per-document operations collected during one reconciliation pass.

use crate::types::Document;
use indexmap::IndexMap;

/// What happened to a document relative to the previous dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Remove,
    None,
}

/// A document paired with its classification.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentOperation {
    pub document: Document,
    pub kind: OperationKind,
}

impl DocumentOperation {
    pub fn new(document: Document, kind: OperationKind) -> Self {
        Self { document, kind }
    }
}

/// Resolve a later classification against an earlier one for the same
/// identity. `None` in the result means both cancel out.
fn merge_kinds(previous: OperationKind, next: OperationKind) -> Option<OperationKind> {
    use OperationKind::*;

    match (previous, next) {
        (prev, None) => Some(prev),
        (None, next) => Some(next),
        (Insert, Insert) | (Insert, Update) => Some(Insert),
        (Insert, Remove) => Option::None,
        (Update, Insert) | (Update, Update) => Some(Update),
        (Update, Remove) => Some(Remove),
        (Remove, Insert) | (Remove, Update) => Some(Update),
        (Remove, Remove) => Some(Remove),
    }
}

/// Operations keyed by document identity, in first-seen order.
#[derive(Clone, Debug, Default)]
pub struct OperationSet {
    entries: IndexMap<String, DocumentOperation>,
}

impl OperationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DocumentOperation> {
        self.entries.get(id)
    }

    /// Record an operation, overwriting whatever was recorded for the identity.
    pub fn replace(&mut self, operation: DocumentOperation) {
        self.entries.insert(operation.document.id.clone(), operation);
    }

    /// Record an operation, resolving it against an earlier one for the same
    /// identity by priority. The surviving entry carries the newest document
    /// unless the new classification is a no-op.
    pub fn merge(&mut self, operation: DocumentOperation) {
        let Some(existing) = self.entries.get_mut(&operation.document.id) else {
            self.entries
                .insert(operation.document.id.clone(), operation);
            return;
        };

        match merge_kinds(existing.kind, operation.kind) {
            Some(kind) => {
                if operation.kind != OperationKind::None {
                    existing.document = operation.document;
                }
                existing.kind = kind;
            }
            None => {
                self.entries.shift_remove(&operation.document.id);
            }
        }
    }

    /// Split into inserted, updated and removed documents. No-ops are dropped.
    pub fn partition(self) -> (Vec<Document>, Vec<Document>, Vec<Document>) {
        let mut inserted = Vec::new();
        let mut updated = Vec::new();
        let mut removed = Vec::new();

        for (_, operation) in self.entries {
            match operation.kind {
                OperationKind::Insert => inserted.push(operation.document),
                OperationKind::Update => updated.push(operation.document),
                OperationKind::Remove => removed.push(operation.document),
                OperationKind::None => {}
            }
        }

        (inserted, updated, removed)
    }
}
