//! Subscription definitions and their fingerprints.
//!
//! Two subscriptions with textually identical fingerprints observe the same
//! dataset and are served by one wire-level subscription.

mod filter;

pub use filter::{CompoundOperator, Filter, FilterVisitor, Relation, DOCUMENT_ID_KEY};

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sort direction of one ordering clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    Descending,
}

/// One ordering clause: a field path and a direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub key_path: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn ascending(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn descending(key_path: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            direction: Direction::Descending,
        }
    }

    fn fingerprint(&self) -> String {
        let dir = match self.direction {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        };
        format!("{}-{}", self.key_path, dir)
    }
}

/// Deterministic identity of a subscription definition.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A collection query: filter, ordering clauses and result-size cap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    collection: String,
    filter: Option<Filter>,
    ordering: Vec<OrderBy>,
    limit: Option<usize>,
}

impl Query {
    /// Every document of a collection, in creation order.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            ordering: Vec::new(),
            limit: None,
        }
    }

    /// A single document, addressed by identity.
    pub fn document(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(collection).filter(Filter::document_id(id)).limit(1)
    }

    /// Add a filter. An existing filter is combined with the new one by `and`.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(previous) => Filter::and(vec![previous, filter]),
            None => filter,
        });
        self
    }

    /// Append an ordering clause.
    pub fn order_by(mut self, clause: OrderBy) -> Self {
        self.ordering.push(clause);
        self
    }

    /// Cap the result size. Replaces any previous cap.
    pub fn limit(mut self, take: usize) -> Self {
        self.limit = Some(take);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn filter_expr(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn ordering(&self) -> &[OrderBy] {
        &self.ordering
    }

    pub fn take(&self) -> Option<usize> {
        self.limit
    }

    /// Directions of the ordering clauses, in clause order.
    pub fn directions(&self) -> Vec<Direction> {
        self.ordering.iter().map(|o| o.direction).collect()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let filter = self.filter.as_ref().map(Filter::fingerprint).unwrap_or_default();
        let ordering: Vec<String> = self.ordering.iter().map(OrderBy::fingerprint).collect();
        let paging = self.limit.map(|t| format!("t{}", t)).unwrap_or_default();
        Fingerprint(format!(
            "collection#{}#{}#{}#{}",
            self.collection,
            filter,
            ordering.join("|"),
            paging
        ))
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.is_empty() {
            return Err(SyncError::InvalidData("collection id is empty".into()));
        }
        if self.limit == Some(0) {
            return Err(SyncError::InvalidData("limit must be positive".into()));
        }
        if self.ordering.iter().any(|o| o.key_path.is_empty()) {
            return Err(SyncError::InvalidData("ordering key path is empty".into()));
        }
        match &self.filter {
            Some(filter) => filter.validate(),
            None => Ok(()),
        }
    }
}

/// A message channel, by exact name or by name prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    Name(String),
    Prefix(String),
}

impl ChannelId {
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            ChannelId::Name(name) => Fingerprint(format!("channel#{}", name)),
            ChannelId::Prefix(prefix) => Fingerprint(format!("channel#{}*", prefix)),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let raw = match self {
            ChannelId::Name(s) | ChannelId::Prefix(s) => s,
        };
        if raw.is_empty() {
            return Err(SyncError::InvalidData("channel id is empty".into()));
        }
        Ok(())
    }
}

/// What a wire-level subscription listens to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubscriptionTarget {
    Collection(Query),
    Channel(ChannelId),
}

impl SubscriptionTarget {
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            SubscriptionTarget::Collection(query) => query.fingerprint(),
            SubscriptionTarget::Channel(channel) => channel.fingerprint(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            SubscriptionTarget::Collection(query) => query.validate(),
            SubscriptionTarget::Channel(channel) => channel.validate(),
        }
    }
}
