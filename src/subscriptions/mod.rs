//! Live subscriptions with fan-out to many subscribers.
//!
//! Every logical subscription is keyed by the fingerprint of its target.
//! Subscriptions with equal fingerprints share one manager, which owns the
//! wire-level subscription, the reconciled dataset and the subscriber
//! roster. Subscribers receive:
//! - the dataset plus added/updated/removed lists on every change
//! - an immediate replay when joining a manager that already has data
//! - one terminal failure if the subscription is lost or the subscriber's
//!   buffer overflows
//!
//! # Example
//!
//! ```ignore
//! let handle = client.subscribe(Query::new("posts").limit(20))?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(SubscriptionEvent::Changed(change)) => println!("{} docs", change.documents.len()),
//!         Ok(SubscriptionEvent::Failed(err)) => break,
//!         Ok(_) => {}
//!         Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod registry;
mod types;

pub(crate) use registry::SubscriptionRegistry;
pub(crate) use types::EventSink;
pub use types::{
    ChangeSet, SubscriptionCallback, SubscriptionEvent, SubscriptionHandle, SubscriptionState,
};
