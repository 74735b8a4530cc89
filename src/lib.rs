//! # docsync
//!
//! Client-side engine for real-time document collection sync.
//!
//! ## Core Concepts
//!
//! - **Queries**: collection, filter, ordering and cap, identified by a textual fingerprint
//! - **Ordered sets**: the materialized result of a query, kept sorted by server sort keys
//! - **Reconciliation**: server batches are diffed into added/updated/removed lists
//! - **Subscriptions**: identical queries share one wire subscription and fan out to many subscribers
//! - **Execution**: optimistic read-decide-write with retry on write conflicts
//! - **Direct access**: one-shot fetches, conditional mutations and channel publishing
//!
//! ## Example
//!
//! ```ignore
//! use docsync::{ClientConfig, ExecutionDecision, OrderBy, Query, SyncClient};
//!
//! let client = SyncClient::new(ClientConfig::default(), transport, backend)?;
//!
//! // Subscribe to the 20 cheapest bikes
//! let handle = client.subscribe(
//!     Query::new("products")
//!         .filter(Filter::equal("category", "bikes"))
//!         .order_by(OrderBy::ascending("price"))
//!         .limit(20),
//! )?;
//!
//! // The transport feeds decoded server events back in
//! client.handle_event(event);
//!
//! // Conditionally bump a counter
//! client.execute("products", "p1", |doc| {
//!     let mut body = doc.body.clone().unwrap_or_default();
//!     body.insert("views".into(), json!(1));
//!     ExecutionDecision::Write(body)
//! })?;
//! ```

pub mod cache;
pub mod client;
pub mod delivery;
pub mod documents;
pub mod error;
pub mod execution;
pub mod query;
pub mod reconcile;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use cache::{CacheStore, MemoryCache};
pub use client::{ClientConfig, DeliveryMode, SyncClient};
pub use delivery::{DeliveryExecutor, InlineExecutor, ThreadExecutor};
pub use documents::{
    compare_documents, DocumentOperation, OperationKind, OperationSet, OrderedDocumentSet,
};
pub use error::{Result, SyncError};
pub use execution::{
    execute, merge_body, DocumentBackend, ExecutionDecision, Mutation, MutationKind, Precondition,
    RetryPolicy,
};
pub use query::{
    ChannelId, CompoundOperator, Direction, Filter, FilterVisitor, Fingerprint, OrderBy, Query,
    Relation, SubscriptionTarget, DOCUMENT_ID_KEY,
};
pub use reconcile::{classify, classify_and_apply, reconcile, Batch, Reconciliation};
pub use subscriptions::{
    ChangeSet, SubscriptionCallback, SubscriptionEvent, SubscriptionHandle, SubscriptionState,
};
pub use transport::{ChannelMessage, ClientRequest, RequestKind, ServerEvent, Transport};
pub use types::*;
