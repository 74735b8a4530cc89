//! Turning server batches into a new materialized set plus a diff.
//!
//! Reconciliation is a pure data transform: it never fails and never
//! performs I/O. The caller owns the previous set and hands it over; the
//! result carries the replacement.
//!
//! # Example
//!
//! ```ignore
//! let result = reconcile(previous, Batch::updates(changed), &directions, Some(20));
//! if result.should_notify() {
//!     fan_out(&result.documents, &result.inserted, &result.updated, &result.removed);
//! }
//! ```

mod batch;
mod classify;

pub use batch::{reconcile, Batch, Reconciliation};
pub use classify::{classify, classify_and_apply};
