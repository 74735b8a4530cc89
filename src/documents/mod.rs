//! Materialized result sets and the operations that change them.
//!
//! - [`OrderedDocumentSet`]: documents unique by identity, sorted by the
//!   subscription's ordering clauses with a creation-order tiebreak
//! - [`OperationSet`]: per-identity insert/update/remove classifications
//!   merged by priority during one reconciliation pass

mod operations;
mod set;

pub use operations::{DocumentOperation, OperationKind, OperationSet};
pub use set::{compare_documents, OrderedDocumentSet};
