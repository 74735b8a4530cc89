//! Per-fingerprint subscription manager.

use crate::cache::CacheStore;
use crate::documents::OrderedDocumentSet;
use crate::error::SyncError;
use crate::query::{Direction, Fingerprint, SubscriptionTarget};
use crate::reconcile::{reconcile, Batch};
use crate::transport::ChannelMessage;
use crate::types::{Document, SubscriberId, SubscriptionId};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::types::{ChangeSet, Outbox, Subscriber, SubscriptionEvent, SubscriptionState};

/// Outcome of detaching a subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Detached {
    NotFound,
    /// Others remain; the wire subscription is untouched.
    Removed,
    /// That was the last one; the manager is now unsubscribing.
    Last,
}

/// Owns one wire-level subscription, its materialized set and the roster
/// of logical subscribers sharing it.
///
/// Every method is called with the manager locked, which serializes
/// registrations, detachments and batches for one fingerprint. Methods that
/// notify subscribers return an [`Outbox`] for the registry to flush once
/// the lock is released.
pub(crate) struct SubscriptionManager {
    id: SubscriptionId,
    fingerprint: Fingerprint,
    target: SubscriptionTarget,
    state: SubscriptionState,
    subscribers: Vec<Subscriber>,
    /// Last known dataset. `None` until the first batch (or cache hit).
    value: Option<OrderedDocumentSet>,
    directions: Vec<Direction>,
    cap: Option<usize>,
    cache: Option<Arc<dyn CacheStore>>,
}

impl SubscriptionManager {
    /// Create a manager for a freshly requested subscription.
    pub(crate) fn new(
        id: SubscriptionId,
        target: SubscriptionTarget,
        first: Subscriber,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        let (directions, cap) = match &target {
            SubscriptionTarget::Collection(query) => (query.directions(), query.take()),
            SubscriptionTarget::Channel(_) => (Vec::new(), None),
        };

        Self {
            id,
            fingerprint: target.fingerprint(),
            target,
            state: SubscriptionState::Registering,
            subscribers: vec![first],
            value: None,
            directions,
            cap,
            cache,
        }
    }

    pub(crate) fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        self.state
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub(crate) fn is_collection(&self) -> bool {
        matches!(self.target, SubscriptionTarget::Collection(_))
    }

    pub(crate) fn documents(&self) -> Option<Vec<Document>> {
        self.value.as_ref().map(OrderedDocumentSet::to_vec)
    }

    /// Attach another subscriber. A known dataset is replayed to it at once.
    pub(crate) fn register_subscriber(&mut self, subscriber: Subscriber) -> Outbox {
        let mut outbox = Outbox::default();

        if let Some(value) = &self.value {
            let replay = SubscriptionEvent::Changed(ChangeSet::replay(value.to_vec()));
            subscriber.deliver(replay, &mut outbox);
        }

        debug!(
            fingerprint = %self.fingerprint,
            subscriber = subscriber.id.0,
            "subscriber attached"
        );
        self.subscribers.push(subscriber);
        outbox
    }

    /// Remove a subscriber. Removing the last one starts retraction.
    pub(crate) fn detach_subscriber(&mut self, id: SubscriberId) -> Detached {
        let Some(index) = self.subscribers.iter().position(|s| s.id == id) else {
            return Detached::NotFound;
        };
        self.subscribers.remove(index);

        if !self.subscribers.is_empty() {
            return Detached::Removed;
        }

        info!(fingerprint = %self.fingerprint, subscription = %self.id, "last subscriber left, unsubscribing");
        self.state = SubscriptionState::Unsubscribing;
        Detached::Last
    }

    /// Server accepted the subscribe request.
    pub(crate) fn on_acknowledged(&mut self) {
        if self.state == SubscriptionState::Registering {
            debug!(fingerprint = %self.fingerprint, "subscribed");
            self.state = SubscriptionState::Subscribed;
        }
    }

    /// Server accepted the unsubscribe request.
    pub(crate) fn on_unsubscribed(&mut self) {
        debug!(fingerprint = %self.fingerprint, "unsubscribed");
        self.state = SubscriptionState::Unsubscribed;
    }

    /// Retraction failed; true when it should be requested again.
    pub(crate) fn should_retry_unsubscribe(&self) -> bool {
        self.state == SubscriptionState::Unsubscribing
    }

    /// Reconcile a server batch and fan the diff out.
    pub(crate) fn on_batch(&mut self, batch: Batch) -> Outbox {
        if matches!(
            self.state,
            SubscriptionState::Unsubscribing | SubscriptionState::Unsubscribed
        ) {
            trace!(fingerprint = %self.fingerprint, "ignoring batch for retired subscription");
            return Outbox::default();
        }

        if let Some(snapshot) = &batch.snapshot {
            debug!(fingerprint = %self.fingerprint, documents = snapshot.len(), "snapshot received");
        }
        if !batch.updates.is_empty() {
            debug!(fingerprint = %self.fingerprint, updates = batch.updates.len(), "updates received");
        }

        let result = reconcile(self.value.take(), batch, &self.directions, self.cap);

        if let Some(cache) = &self.cache {
            cache.store(&self.fingerprint, result.documents.as_slice());
        }

        if !result.should_notify() {
            self.value = Some(result.documents);
            return Outbox::default();
        }

        trace!(
            fingerprint = %self.fingerprint,
            inserted = result.inserted.len(),
            updated = result.updated.len(),
            removed = result.removed.len(),
            "dataset changed"
        );

        let event = SubscriptionEvent::Changed(ChangeSet {
            documents: result.documents.to_vec(),
            added: result.inserted,
            updated: result.updated,
            removed: result.removed,
        });
        self.value = Some(result.documents);

        self.broadcast(event)
    }

    /// Apply a dataset loaded from the cache, unless live data already arrived.
    pub(crate) fn apply_cached(&mut self, documents: Vec<Document>) -> Outbox {
        if self.value.is_some() {
            debug!(fingerprint = %self.fingerprint, "live data present, cached dataset discarded");
            return Outbox::default();
        }
        self.on_batch(Batch::snapshot(documents))
    }

    /// Fan a channel message out to every subscriber.
    pub(crate) fn on_channel_message(&mut self, message: ChannelMessage) -> Outbox {
        if self.state == SubscriptionState::Unsubscribing {
            return Outbox::default();
        }
        trace!(fingerprint = %self.fingerprint, channel = %message.channel, "channel message");
        self.broadcast(SubscriptionEvent::Message(message))
    }

    /// Subscription failed: drop the dataset and tell every subscriber.
    /// The manager is finished afterwards.
    pub(crate) fn on_failure(&mut self, error: SyncError) -> Outbox {
        warn!(fingerprint = %self.fingerprint, error = %error, "subscription failed");

        self.value = None;
        if self.is_collection() {
            if let Some(cache) = &self.cache {
                cache.store(&self.fingerprint, &[]);
            }
        }
        self.state = SubscriptionState::Unsubscribed;

        let mut outbox = Outbox::default();
        for subscriber in self.subscribers.drain(..) {
            subscriber.deliver(SubscriptionEvent::Failed(error.clone()), &mut outbox);
        }
        // Nobody is attached any more
        outbox.dead.clear();
        outbox
    }

    fn broadcast(&self, event: SubscriptionEvent) -> Outbox {
        let mut outbox = Outbox::default();
        for subscriber in &self.subscribers {
            subscriber.deliver(event.clone(), &mut outbox);
        }
        outbox
    }
}
